//! CLI Commands

pub mod cleanup;
pub mod init;
pub mod render;
pub mod run;
