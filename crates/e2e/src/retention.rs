//! Artifact retention
//!
//! Keeps only the newest files of each [`RetentionCategory`] and deletes the
//! rest. Deleting is best-effort: a file that is still held open (typically
//! a screenshot or video the browser just finished writing) is retried a few
//! times and then left in place with a warning.
//!
//! Categories are independent. A directory that cannot be created or read
//! fails only its own category.
//!
//! With [`RetryStrategy::Requeue`] nothing sleeps: busy files are retried
//! after the other candidates, and files that stay busy once the queue stops
//! making progress are handed back as deferred. [`cleanup_async`] retries
//! those every `retry_interval` on the runtime timer.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uitrace_common::{RetentionCategory, RetentionConfig};

use crate::error::{E2eError, E2eResult};

/// Removes files; the seam used to simulate locked files
pub trait Reaper: Send + Sync {
    /// Open the file for writing. Fails while another process holds it
    /// exclusively.
    fn probe(&self, path: &Path) -> io::Result<()>;

    /// Remove the file and make sure it is gone
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Filesystem-backed reaper
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReaper;

impl Reaper for FsReaper {
    fn probe(&self, path: &Path) -> io::Result<()> {
        OpenOptions::new().read(true).write(true).open(path).map(drop)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)?;
        if path.exists() {
            return Err(io::Error::other("file still exists after removal"));
        }
        Ok(())
    }
}

/// How a busy file is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Sleep `retry_interval` between attempts on the same file
    #[default]
    Blocking,
    /// Move a busy file to the back of the queue and try the others first;
    /// never sleeps. Files still busy when a pass frees nothing are deferred
    /// to the caller.
    Requeue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Attempts per file, including the first one
    pub max_attempts: u32,
    pub retry_interval: Duration,
    pub strategy: RetryStrategy,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_interval: Duration::from_secs(2),
            strategy: RetryStrategy::Blocking,
        }
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_interval: Duration::from_millis(config.retry_interval_ms),
            strategy: RetryStrategy::Blocking,
        }
    }
}

/// A file that survived every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRemoval {
    pub path: PathBuf,
    pub attempts: u32,
    pub error: String,
}

/// A busy file waiting for another pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRemoval {
    pub path: PathBuf,
    /// Attempts spent so far
    pub attempts: u32,
    pub error: String,
}

/// What happened in one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    pub category: RetentionCategory,
    /// The directory did not exist and was created
    pub created_dir: bool,
    /// Files matching the extension
    pub matched: usize,
    /// Files kept inside the keep window
    pub kept: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    /// Files that disappeared before we removed them
    pub vanished: Vec<PathBuf>,
    pub failed: Vec<FailedRemoval>,
    /// Busy files with attempts left; only used by the requeue strategy
    pub deferred: Vec<DeferredRemoval>,
}

impl CategoryReport {
    fn new(category: &RetentionCategory) -> Self {
        Self {
            category: category.clone(),
            created_dir: false,
            matched: 0,
            kept: Vec::new(),
            deleted: Vec::new(),
            vanished: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
        }
    }
}

/// Result of one category; a failed category does not stop the others
#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: RetentionCategory,
    pub result: E2eResult<CategoryReport>,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub categories: Vec<CategoryOutcome>,
}

impl CleanupReport {
    pub fn deleted_count(&self) -> usize {
        self.reports().map(|r| r.deleted.len()).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.reports().map(|r| r.failed.len()).sum()
    }

    pub fn deferred_count(&self) -> usize {
        self.reports().map(|r| r.deferred.len()).sum()
    }

    /// Categories whose directory could not be handled
    pub fn errors(&self) -> impl Iterator<Item = (&RetentionCategory, &E2eError)> {
        self.categories
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.category, e)))
    }

    pub fn reports(&self) -> impl Iterator<Item = &CategoryReport> {
        self.categories.iter().filter_map(|o| o.result.as_ref().ok())
    }
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    name: String,
    modified: SystemTime,
}

struct Queued {
    path: PathBuf,
    attempts: u32,
}

enum Attempt {
    Removed,
    Vanished,
    Busy(io::Error),
}

/// Applies retention categories to their directories
pub struct RetentionManager<R: Reaper = FsReaper> {
    policy: RetentionPolicy,
    reaper: R,
}

impl RetentionManager {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self::with_reaper(policy, FsReaper)
    }
}

impl Default for RetentionManager {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl<R: Reaper> RetentionManager<R> {
    pub fn with_reaper(policy: RetentionPolicy, reaper: R) -> Self {
        Self { policy, reaper }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Clean every category, in order
    pub fn cleanup(&self, categories: &[RetentionCategory]) -> CleanupReport {
        info!("Cleaning up old test artifacts...");
        let mut report = CleanupReport::default();

        for category in categories {
            let result = self.cleanup_category(category);
            if let Err(e) = &result {
                warn!("Cleanup of {} failed: {}", category, e);
            }
            report.categories.push(CategoryOutcome {
                category: category.clone(),
                result,
            });
        }

        info!(
            "Cleanup finished: {} deleted, {} left in place",
            report.deleted_count(),
            report.failed_count()
        );
        report
    }

    /// Clean a single category
    pub fn cleanup_category(&self, category: &RetentionCategory) -> E2eResult<CategoryReport> {
        let dir = &category.directory;
        let mut report = CategoryReport::new(category);
        info!("Cleaning {}", category);

        match fs::metadata(dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(dir).map_err(|source| E2eError::ArtifactDir {
                    path: dir.clone(),
                    source,
                })?;
                debug!("Created {}", dir.display());
                report.created_dir = true;
                return Ok(report);
            }
            Err(source) => {
                return Err(E2eError::ArtifactDir {
                    path: dir.clone(),
                    source,
                })
            }
            Ok(meta) if !meta.is_dir() => {
                return Err(E2eError::ArtifactDir {
                    path: dir.clone(),
                    source: io::Error::other("not a directory"),
                })
            }
            Ok(_) => {}
        }

        let candidates = self.scan(category)?;
        report.matched = candidates.len();

        if candidates.len() <= category.keep {
            debug!(
                "{} holds {} matching file(s), within the limit of {}",
                dir.display(),
                candidates.len(),
                category.keep
            );
            report.kept = candidates.into_iter().map(|c| c.path).collect();
            return Ok(report);
        }

        let mut candidates = candidates;
        let excess = candidates.split_off(category.keep);
        report.kept = candidates.into_iter().map(|c| c.path).collect();
        let excess: Vec<PathBuf> = excess.into_iter().map(|c| c.path).collect();

        match self.policy.strategy {
            RetryStrategy::Blocking => {
                for path in excess {
                    self.remove_blocking(path, &mut report);
                }
            }
            RetryStrategy::Requeue => {
                let queue = excess
                    .into_iter()
                    .map(|path| Queued { path, attempts: 0 })
                    .collect();
                self.remove_requeued(queue, &mut report);
            }
        }

        Ok(report)
    }

    /// One more round over every deferred file. Returns how many are still
    /// deferred afterwards.
    pub fn retry_deferred(&self, report: &mut CleanupReport) -> usize {
        for outcome in report.categories.iter_mut() {
            let Ok(category) = outcome.result.as_mut() else {
                continue;
            };
            if category.deferred.is_empty() {
                continue;
            }
            let queue = std::mem::take(&mut category.deferred)
                .into_iter()
                .map(|d| Queued {
                    path: d.path,
                    attempts: d.attempts,
                })
                .collect();
            self.remove_requeued(queue, category);
        }
        report.deferred_count()
    }

    /// Matching regular files directly inside the directory, newest first
    fn scan(&self, category: &RetentionCategory) -> E2eResult<Vec<Candidate>> {
        let dir = &category.directory;
        let entries = fs::read_dir(dir).map_err(|source| E2eError::ArtifactDir {
            path: dir.clone(),
            source,
        })?;

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            // Subdirectories and symlinks are never touched
            match entry.file_type() {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !category.matches(&name) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    debug!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            candidates.push(Candidate {
                path: entry.path(),
                name,
                modified,
            });
        }

        candidates.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(candidates)
    }

    fn attempt(&self, path: &Path) -> Attempt {
        match self.reaper.probe(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Attempt::Vanished,
            Err(e) => return Attempt::Busy(e),
            Ok(()) => {}
        }
        match self.reaper.remove(path) {
            Ok(()) => Attempt::Removed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Attempt::Vanished,
            Err(e) => Attempt::Busy(e),
        }
    }

    fn remove_blocking(&self, path: PathBuf, report: &mut CategoryReport) {
        let max = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max {
            match self.attempt(&path) {
                Attempt::Removed => {
                    info!("Deleted old artifact: {}", path.display());
                    report.deleted.push(path);
                    return;
                }
                Attempt::Vanished => {
                    debug!("{} already gone", path.display());
                    report.vanished.push(path);
                    return;
                }
                Attempt::Busy(e) => {
                    warn!(
                        "{} may be in use, retrying ({}/{}): {}",
                        path.display(),
                        attempt,
                        max,
                        e
                    );
                    last_error = Some(e);
                    if attempt < max {
                        std::thread::sleep(self.policy.retry_interval);
                    }
                }
            }
        }

        self.give_up(path, max, last_error, report);
    }

    /// Passes over the queue until it empties or a pass frees nothing.
    /// Every busy file waits for all the others before its next attempt.
    fn remove_requeued(&self, mut queue: VecDeque<Queued>, report: &mut CategoryReport) {
        let max = self.policy.max_attempts.max(1);

        while !queue.is_empty() {
            let mut progressed = false;
            let mut busy = VecDeque::new();

            for mut item in queue.drain(..) {
                item.attempts += 1;
                match self.attempt(&item.path) {
                    Attempt::Removed => {
                        info!("Deleted old artifact: {}", item.path.display());
                        report.deleted.push(item.path);
                        progressed = true;
                    }
                    Attempt::Vanished => {
                        report.vanished.push(item.path);
                        progressed = true;
                    }
                    Attempt::Busy(e) if item.attempts >= max => {
                        self.give_up(item.path, item.attempts, Some(e), report)
                    }
                    Attempt::Busy(e) => {
                        debug!("{} busy ({}), deferring", item.path.display(), e);
                        busy.push_back((item, e));
                    }
                }
            }

            if !progressed {
                report
                    .deferred
                    .extend(busy.into_iter().map(|(item, e)| DeferredRemoval {
                        path: item.path,
                        attempts: item.attempts,
                        error: e.to_string(),
                    }));
                return;
            }
            queue = busy.into_iter().map(|(item, _)| item).collect();
        }
    }

    fn give_up(
        &self,
        path: PathBuf,
        attempts: u32,
        error: Option<io::Error>,
        report: &mut CategoryReport,
    ) {
        let error = error.map(|e| e.to_string()).unwrap_or_default();
        warn!(
            "Could not delete {} after {} attempts: {}",
            path.display(),
            attempts,
            error
        );
        report.failed.push(FailedRemoval {
            path,
            attempts,
            error,
        });
    }
}

/// Run a cleanup on a blocking thread, then retry deferred files every
/// `retry_interval` until none are left
pub async fn cleanup_async<R: Reaper + 'static>(
    manager: Arc<RetentionManager<R>>,
    categories: Vec<RetentionCategory>,
) -> E2eResult<CleanupReport> {
    let interval = manager.policy().retry_interval;
    let worker = Arc::clone(&manager);
    let mut report = tokio::task::spawn_blocking(move || worker.cleanup(&categories)).await?;

    while report.deferred_count() > 0 {
        debug!(
            "{} busy artifact(s) deferred, retrying in {:?}",
            report.deferred_count(),
            interval
        );
        tokio::time::sleep(interval).await;
        let worker = Arc::clone(&manager);
        report = tokio::task::spawn_blocking(move || {
            worker.retry_deferred(&mut report);
            report
        })
        .await?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fails `probe` for selected files a fixed number of times
    #[derive(Default)]
    struct LockingReaper {
        locks: Mutex<HashMap<PathBuf, u32>>,
        probes: Mutex<Vec<PathBuf>>,
    }

    impl LockingReaper {
        fn lock(self, path: &Path, times: u32) -> Self {
            self.locks.lock().unwrap().insert(path.to_path_buf(), times);
            self
        }
    }

    impl Reaper for LockingReaper {
        fn probe(&self, path: &Path) -> io::Result<()> {
            self.probes.lock().unwrap().push(path.to_path_buf());
            let mut locks = self.locks.lock().unwrap();
            if let Some(left) = locks.get_mut(path) {
                if *left > 0 {
                    *left -= 1;
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
                }
            }
            FsReaper.probe(path)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            FsReaper.remove(path)
        }
    }

    fn fast_policy(strategy: RetryStrategy) -> RetentionPolicy {
        RetentionPolicy {
            max_attempts: 3,
            retry_interval: Duration::from_millis(1),
            strategy,
        }
    }

    fn touch(path: &Path, age_secs: u64) {
        fs::write(path, b"artifact").unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        filetime::set_file_mtime(path, filetime::FileTime::from_system_time(mtime)).unwrap();
    }

    #[test]
    fn test_missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("screenshots");
        let manager = RetentionManager::new(fast_policy(RetryStrategy::Blocking));

        let report = manager
            .cleanup_category(&RetentionCategory::new(&target, ".png", 3))
            .unwrap();
        assert!(target.is_dir());
        assert!(report.created_dir);
        assert!(report.deleted.is_empty());
    }

    #[test]
    fn test_file_in_place_of_directory_fails_category() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("reports");
        fs::write(&target, b"not a dir").unwrap();
        let manager = RetentionManager::new(fast_policy(RetryStrategy::Blocking));

        let err = manager
            .cleanup_category(&RetentionCategory::new(&target, ".html", 1))
            .unwrap_err();
        assert!(matches!(err, E2eError::ArtifactDir { .. }));
    }

    #[test]
    fn test_transient_lock_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let newest = dir.path().join("new.png");
        let oldest = dir.path().join("old.png");
        touch(&newest, 10);
        touch(&oldest, 100);

        let reaper = LockingReaper::default().lock(&oldest, 2);
        let manager = RetentionManager::with_reaper(fast_policy(RetryStrategy::Blocking), reaper);
        let report = manager
            .cleanup_category(&RetentionCategory::new(dir.path(), ".png", 1))
            .unwrap();

        assert_eq!(report.deleted, vec![oldest.clone()]);
        assert!(report.failed.is_empty());
        assert!(!oldest.exists());
        assert!(newest.exists());
    }

    #[test]
    fn test_stuck_file_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let newest = dir.path().join("new.webm");
        let stuck = dir.path().join("stuck.webm");
        touch(&newest, 10);
        touch(&stuck, 100);

        let reaper = LockingReaper::default().lock(&stuck, u32::MAX);
        let manager = RetentionManager::with_reaper(fast_policy(RetryStrategy::Blocking), reaper);
        let report = manager
            .cleanup_category(&RetentionCategory::new(dir.path(), ".webm", 1))
            .unwrap();

        assert!(stuck.exists());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, stuck);
        assert_eq!(report.failed[0].attempts, 3);
        assert!(report.failed[0].error.contains("locked"));
    }

    #[test]
    fn test_requeue_tries_other_files_before_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.png");
        let busy = dir.path().join("busy.png");
        let free = dir.path().join("free.png");
        touch(&keep, 1);
        touch(&busy, 50);
        touch(&free, 100);

        let reaper = LockingReaper::default().lock(&busy, 1);
        let manager = RetentionManager::with_reaper(fast_policy(RetryStrategy::Requeue), reaper);
        let report = manager
            .cleanup_category(&RetentionCategory::new(dir.path(), ".png", 1))
            .unwrap();

        assert_eq!(report.deleted, vec![free.clone(), busy.clone()]);
        let probes = manager.reaper.probes.lock().unwrap().clone();
        assert_eq!(probes, vec![busy.clone(), free, busy]);
    }

    #[test]
    fn test_requeue_defers_a_lone_busy_file() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.webm");
        let busy = dir.path().join("busy.webm");
        touch(&keep, 1);
        touch(&busy, 50);

        let reaper = LockingReaper::default().lock(&busy, 2);
        let manager = RetentionManager::with_reaper(fast_policy(RetryStrategy::Requeue), reaper);
        let mut report = manager.cleanup(&[RetentionCategory::new(dir.path(), ".webm", 1)]);

        let category = report.reports().next().unwrap();
        assert!(category.failed.is_empty());
        assert_eq!(category.deferred.len(), 1);
        assert_eq!(category.deferred[0].attempts, 1);
        assert_eq!(manager.reaper.probes.lock().unwrap().len(), 1);

        assert_eq!(manager.retry_deferred(&mut report), 1);
        assert_eq!(manager.retry_deferred(&mut report), 0);
        assert_eq!(report.deleted_count(), 1);
        assert_eq!(report.failed_count(), 0);
        assert!(!busy.exists());
    }

    #[test]
    fn test_requeue_gives_up_across_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.webm");
        let stuck = dir.path().join("stuck.webm");
        touch(&keep, 1);
        touch(&stuck, 50);

        let reaper = LockingReaper::default().lock(&stuck, u32::MAX);
        let manager = RetentionManager::with_reaper(fast_policy(RetryStrategy::Requeue), reaper);
        let mut report = manager.cleanup(&[RetentionCategory::new(dir.path(), ".webm", 1)]);
        while manager.retry_deferred(&mut report) > 0 {}

        let category = report.reports().next().unwrap();
        assert_eq!(category.failed.len(), 1);
        assert_eq!(category.failed[0].attempts, 3);
        assert!(category.deferred.is_empty());
        assert!(stuck.exists());
    }

    #[tokio::test]
    async fn test_cleanup_async_waits_out_a_short_lock() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.png");
        let busy = dir.path().join("busy.png");
        touch(&keep, 1);
        touch(&busy, 50);

        let reaper = LockingReaper::default().lock(&busy, 2);
        let manager = Arc::new(RetentionManager::with_reaper(
            fast_policy(RetryStrategy::Requeue),
            reaper,
        ));
        let report = cleanup_async(
            Arc::clone(&manager),
            vec![RetentionCategory::new(dir.path(), ".png", 1)],
        )
        .await
        .unwrap();

        assert_eq!(report.deleted_count(), 1);
        assert_eq!(report.deferred_count(), 0);
        assert_eq!(manager.reaper.probes.lock().unwrap().len(), 3);
        assert!(keep.exists());
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetentionConfig {
            enabled: true,
            max_attempts: 5,
            retry_interval_ms: 250,
            categories: None,
        };
        let policy = RetentionPolicy::from(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.retry_interval, Duration::from_millis(250));
        assert_eq!(policy.strategy, RetryStrategy::Blocking);
    }
}
