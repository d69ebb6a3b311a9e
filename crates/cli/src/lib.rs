//! uitrace CLI
//!
//! Command-line front end for running the login scenarios against one or
//! more browser engines, re-rendering saved reports and pruning old
//! artifacts.

pub mod commands;
pub mod output;
