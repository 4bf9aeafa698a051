//! File system watcher that keeps a [`SkillRepository`] in sync with disk.
//!
//! Notify events are reduced to a bare "something changed" signal, debounced,
//! and answered with a full rescan whose result replaces the repository
//! snapshot in one swap.

mod debounce;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{EmptyScanPolicy, WatchConfig};
use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, WatchError};
use crate::models::{FolderDiagnostic, ScanReport, ScanStats};
use crate::repository::SkillRepository;
use crate::scanner::{folder_skip_reason, SkillScanner, SKILL_FILE_NAME};
use debounce::{Debouncer, ReloadHandler};

/// Callback invoked after every successful reload.
pub type ReloadCallback = Arc<dyn Fn(&ReloadSummary) + Send + Sync>;

// ── Options ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period after the last relevant change.
    pub debounce: Duration,
    pub on_empty: EmptyScanPolicy,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            on_empty: EmptyScanPolicy::Retain,
        }
    }
}

impl From<&WatchConfig> for WatchOptions {
    fn from(config: &WatchConfig) -> Self {
        Self {
            debounce: config.debounce(),
            on_empty: config.on_empty,
        }
    }
}

// ── Reload ──────────────────────────────────────────────────────────────

/// What a completed reload put into the repository.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadSummary {
    pub root: PathBuf,
    pub stats: ScanStats,
    /// Skills held by the repository after the swap.
    pub skill_count: usize,
    pub diagnostics: Vec<FolderDiagnostic>,
    /// The root had no skill folders and the catalog was emptied.
    pub cleared: bool,
    pub reloaded_at: DateTime<Utc>,
}

impl ReloadSummary {
    fn from_report(report: &ScanReport) -> Self {
        Self {
            root: report.root.clone(),
            stats: report.stats,
            skill_count: report.len(),
            diagnostics: report.diagnostics.clone(),
            cleared: false,
            reloaded_at: Utc::now(),
        }
    }

    fn cleared(root: PathBuf, skipped: usize) -> Self {
        Self {
            root,
            stats: ScanStats {
                skipped,
                ..ScanStats::default()
            },
            skill_count: 0,
            diagnostics: Vec::new(),
            cleared: true,
            reloaded_at: Utc::now(),
        }
    }
}

/// Rescan the root and swap the result into `repository`.
///
/// On any error the repository keeps its current snapshot, except when the
/// root has no skill folders and `policy` is [`EmptyScanPolicy::Clear`].
pub async fn reload_snapshot(
    scanner: &SkillScanner,
    repository: &SkillRepository,
    policy: EmptyScanPolicy,
) -> Result<ReloadSummary, CatalogError> {
    match scanner.scan_async().await {
        Ok(report) => {
            let summary = ReloadSummary::from_report(&report);
            repository.replace_all(report.skills.into_values());
            Ok(summary)
        }
        Err(CatalogError::NoSkillFolders { root, skipped }) if policy == EmptyScanPolicy::Clear => {
            warn!("No skill folders in {:?}, clearing catalog", root);
            repository.clear();
            Ok(ReloadSummary::cleared(root, skipped))
        }
        Err(e) => Err(e),
    }
}

/// Reload handler used by [`SkillWatcher`].
pub(crate) struct SnapshotReloader {
    scanner: SkillScanner,
    repository: Arc<SkillRepository>,
    policy: EmptyScanPolicy,
    on_reload: ReloadCallback,
    errors: mpsc::UnboundedSender<CatalogError>,
}

#[async_trait]
impl ReloadHandler for SnapshotReloader {
    async fn reload(&self) {
        info!("Reloading skills from {:?}", self.scanner.root());
        match reload_snapshot(&self.scanner, &self.repository, self.policy).await {
            Ok(summary) => {
                info!(
                    "Reload complete: {} loaded, {} skipped, {} failed",
                    summary.stats.loaded, summary.stats.skipped, summary.stats.failed
                );
                (self.on_reload)(&summary);
                if summary.cleared {
                    let _ = self.errors.send(CatalogError::NoSkillFolders {
                        root: summary.root,
                        skipped: summary.stats.skipped,
                    });
                }
            }
            Err(e) => {
                warn!("Reload failed, keeping previous skills: {}", e);
                let _ = self.errors.send(e);
            }
        }
    }
}

// ── Relevance ───────────────────────────────────────────────────────────

/// Whether a changed `path` can affect the catalog under `root`.
///
/// True only for `<root>/<admissible-name>/SKILL.md`; existence is not
/// checked so removals still count.
pub fn is_relevant(root: &Path, path: &Path) -> bool {
    if path.file_name() != Some(OsStr::new(SKILL_FILE_NAME)) {
        return false;
    }
    path.parent().is_some_and(|folder| is_skill_folder(root, folder))
}

/// Whether `path` names a direct child of `root` that could hold a skill.
///
/// A folder moved or renamed into place arrives as a single event on the
/// folder itself, with nothing reported for the files inside it.
pub fn is_skill_folder(root: &Path, path: &Path) -> bool {
    path.parent() == Some(root)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| folder_skip_reason(name).is_none())
}

fn is_relevant_event(root: &Path, event: &Event) -> bool {
    let folder_change = match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            true
        }
        EventKind::Modify(_) => false,
        _ => return false,
    };
    event
        .paths
        .iter()
        .any(|p| is_relevant(root, p) || (folder_change && is_skill_folder(root, p)))
}

// ── Watcher ─────────────────────────────────────────────────────────────

/// Watches a skills root and reloads the repository on relevant changes.
///
/// Must be started inside a tokio runtime. Call [`stop`](Self::stop) to shut
/// down cleanly.
pub struct SkillWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
    debouncer: Debouncer,
}

impl SkillWatcher {
    /// Subscribe to `root` and start the debounce loop.
    ///
    /// Returns the watcher and a channel carrying reload and backend errors.
    pub fn start<F>(
        root: impl AsRef<Path>,
        repository: Arc<SkillRepository>,
        options: WatchOptions,
        on_reload: F,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CatalogError>), WatchError>
    where
        F: Fn(&ReloadSummary) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WatchError::Setup(format!("No tokio runtime: {}", e)))?;

        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .map_err(|e| WatchError::Watch(format!("Failed to watch {:?}: {}", root, e)))?;

        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let reloader = Arc::new(SnapshotReloader {
            scanner: SkillScanner::new(&root),
            repository,
            policy: options.on_empty,
            on_reload: Arc::new(on_reload),
            errors: errors_tx.clone(),
        });
        let debouncer = Debouncer::spawn(&runtime, reloader, options.debounce);

        let signals = debouncer.sender();
        let event_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if is_relevant_event(&event_root, &event) {
                        debug!("Skill change: {:?} {:?}", event.kind, event.paths);
                        let _ = signals.send(());
                    }
                }
                Err(e) => {
                    warn!("Watch error: {:?}", e);
                    let _ = errors_tx.send(CatalogError::Watch(WatchError::Notify(e)));
                }
            }
        })
        .map_err(|e| WatchError::Setup(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(format!("Failed to watch {:?}: {}", root, e)))?;

        info!("Started watching skills directory: {:?}", root);
        Ok((
            Self {
                root,
                watcher,
                debouncer,
            },
            errors_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unsubscribe and wait for any in-flight reload.
    ///
    /// No reload callback runs after this returns.
    pub async fn stop(self) {
        let Self {
            root,
            watcher,
            debouncer,
        } = self;
        drop(watcher);
        debouncer.stop().await;
        info!("Stopped watching skills directory: {:?}", root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_skill(root: &Path, folder: &str, name: &str) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(SKILL_FILE_NAME),
            format!("---\nname: {name}\ndescription: The {name} skill\n---\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_is_relevant() {
        let root = Path::new("/skills");
        assert!(is_relevant(root, Path::new("/skills/excel/SKILL.md")));
        assert!(!is_relevant(root, Path::new("/skills/excel/notes.md")));
        assert!(!is_relevant(root, Path::new("/skills/excel/skill.md")));
        assert!(!is_relevant(root, Path::new("/skills/SKILL.md")));
        assert!(!is_relevant(root, Path::new("/skills/excel/examples/SKILL.md")));
        assert!(!is_relevant(root, Path::new("/skills/.git/SKILL.md")));
        assert!(!is_relevant(root, Path::new("/skills/_drafts/SKILL.md")));
        assert!(!is_relevant(root, Path::new("/skills/node_modules/SKILL.md")));
        assert!(!is_relevant(root, Path::new("/other/excel/SKILL.md")));
    }

    #[test]
    fn test_is_skill_folder() {
        let root = Path::new("/skills");
        assert!(is_skill_folder(root, Path::new("/skills/excel")));
        assert!(!is_skill_folder(root, Path::new("/skills/.git")));
        assert!(!is_skill_folder(root, Path::new("/skills/_drafts")));
        assert!(!is_skill_folder(root, Path::new("/skills/excel/examples")));
        assert!(!is_skill_folder(root, Path::new("/skills")));
        assert!(!is_skill_folder(root, Path::new("/other/excel")));
    }

    #[test]
    fn test_event_kind_filter() {
        use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};

        let root = Path::new("/skills");
        let file = PathBuf::from("/skills/excel/SKILL.md");
        let folder = PathBuf::from("/skills/excel");
        let event = |kind, path: &PathBuf| Event::new(kind).add_path(path.clone());

        assert!(is_relevant_event(root, &event(EventKind::Modify(ModifyKind::Any), &file)));
        assert!(!is_relevant_event(root, &event(EventKind::Access(AccessKind::Any), &file)));

        assert!(is_relevant_event(root, &event(EventKind::Create(CreateKind::Folder), &folder)));
        assert!(is_relevant_event(root, &event(EventKind::Remove(RemoveKind::Folder), &folder)));
        assert!(is_relevant_event(
            root,
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &folder)
        ));
        assert!(!is_relevant_event(
            root,
            &event(EventKind::Modify(ModifyKind::Data(DataChange::Any)), &folder)
        ));
        assert!(!is_relevant_event(
            root,
            &event(EventKind::Create(CreateKind::Folder), &PathBuf::from("/skills/.cache"))
        ));

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/staging/excel"))
            .add_path(folder);
        assert!(is_relevant_event(root, &rename));
    }

    #[tokio::test]
    async fn test_reload_replaces_snapshot() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "a", "alpha");
        let scanner = SkillScanner::new(tmp.path());
        let repo = SkillRepository::new();

        let summary = reload_snapshot(&scanner, &repo, EmptyScanPolicy::Retain)
            .await
            .unwrap();
        assert_eq!(summary.skill_count, 1);
        assert!(repo.contains("alpha"));

        fs::remove_dir_all(tmp.path().join("a")).unwrap();
        write_skill(tmp.path(), "b", "beta");
        reload_snapshot(&scanner, &repo, EmptyScanPolicy::Retain)
            .await
            .unwrap();
        assert!(!repo.contains("alpha"));
        assert!(repo.contains("beta"));
    }

    #[tokio::test]
    async fn test_empty_rescan_retains_snapshot() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "a", "alpha");
        let scanner = SkillScanner::new(tmp.path());
        let repo = SkillRepository::new();
        reload_snapshot(&scanner, &repo, EmptyScanPolicy::Retain)
            .await
            .unwrap();

        fs::remove_dir_all(tmp.path().join("a")).unwrap();
        let err = reload_snapshot(&scanner, &repo, EmptyScanPolicy::Retain)
            .await
            .unwrap_err();
        assert!(err.is_empty_root());
        assert!(repo.contains("alpha"));
    }

    #[tokio::test]
    async fn test_empty_rescan_clears_when_configured() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "a", "alpha");
        let scanner = SkillScanner::new(tmp.path());
        let repo = SkillRepository::new();
        reload_snapshot(&scanner, &repo, EmptyScanPolicy::Clear)
            .await
            .unwrap();

        fs::remove_dir_all(tmp.path().join("a")).unwrap();
        let summary = reload_snapshot(&scanner, &repo, EmptyScanPolicy::Clear)
            .await
            .unwrap();
        assert!(summary.cleared);
        assert_eq!(summary.skill_count, 0);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_reloader_reports_errors_and_callbacks() {
        let tmp = TempDir::new().unwrap();
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
        let (summary_tx, mut summary_rx) = mpsc::unbounded_channel();
        let reloader = SnapshotReloader {
            scanner: SkillScanner::new(tmp.path()),
            repository: Arc::new(SkillRepository::new()),
            policy: EmptyScanPolicy::Clear,
            on_reload: Arc::new(move |summary: &ReloadSummary| {
                let _ = summary_tx.send(summary.clone());
            }),
            errors: errors_tx,
        };

        reloader.reload().await;
        let summary = summary_rx.try_recv().unwrap();
        assert!(summary.cleared);
        assert!(errors_rx.try_recv().unwrap().is_empty_root());

        fs::remove_dir_all(tmp.path()).unwrap();
        reloader.reload().await;
        assert!(summary_rx.try_recv().is_err());
        assert!(matches!(
            errors_rx.try_recv().unwrap(),
            CatalogError::RootMissing(_)
        ));
    }

    #[test]
    fn test_start_requires_runtime() {
        let tmp = TempDir::new().unwrap();
        let result = SkillWatcher::start(
            tmp.path(),
            Arc::new(SkillRepository::new()),
            WatchOptions::default(),
            |_| {},
        );
        assert!(matches!(result, Err(WatchError::Setup(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_missing_root() {
        let tmp = TempDir::new().unwrap();
        let result = SkillWatcher::start(
            tmp.path().join("missing"),
            Arc::new(SkillRepository::new()),
            WatchOptions::default(),
            |_| {},
        );
        assert!(matches!(result, Err(WatchError::Watch(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_picks_up_new_skill() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "a", "alpha");
        let repo = Arc::new(SkillRepository::new());
        reload_snapshot(&SkillScanner::new(tmp.path()), &repo, EmptyScanPolicy::Retain)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = WatchOptions {
            debounce: Duration::from_millis(100),
            ..WatchOptions::default()
        };
        let (watcher, _errors) = SkillWatcher::start(tmp.path(), Arc::clone(&repo), options, move |s| {
            let _ = tx.send(s.skill_count);
        })
        .unwrap();

        write_skill(tmp.path(), "b", "beta");
        let count = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(count, 2);
        assert!(repo.contains("beta"));
        watcher.stop().await;
    }

    async fn start_watching(
        root: &Path,
    ) -> (SkillWatcher, Arc<SkillRepository>, mpsc::UnboundedReceiver<usize>) {
        let repo = Arc::new(SkillRepository::new());
        reload_snapshot(&SkillScanner::new(root), &repo, EmptyScanPolicy::Retain)
            .await
            .unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let options = WatchOptions {
            debounce: Duration::from_millis(100),
            ..WatchOptions::default()
        };
        let (watcher, _errors) = SkillWatcher::start(root, Arc::clone(&repo), options, move |s| {
            let _ = tx.send(s.skill_count);
        })
        .unwrap();
        (watcher, repo, rx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_picks_up_moved_in_folder() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("skills");
        let staging = tmp.path().join("staging");
        write_skill(&root, "a", "alpha");
        write_skill(&staging, "b", "beta");
        let (watcher, repo, mut rx) = start_watching(&root).await;

        fs::rename(staging.join("b"), root.join("b")).unwrap();
        let count = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(count, 2);
        assert!(repo.contains("beta"));
        watcher.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_follows_folder_rename() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "a", "alpha");
        let (watcher, repo, mut rx) = start_watching(tmp.path()).await;
        assert!(repo.get_by_folder("a").is_some());

        fs::rename(tmp.path().join("a"), tmp.path().join("renamed")).unwrap();
        let count = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(count, 1);
        assert!(repo.get_by_folder("a").is_none());
        assert_eq!(repo.get_by_folder("renamed").unwrap().name, "alpha");
        watcher.stop().await;
    }
}
