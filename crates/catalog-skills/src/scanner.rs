//! Directory scanner: one pass over the skills root.
//!
//! Only direct children of the root are considered. Each admissible folder
//! is parsed exactly once; a broken folder is recorded in the report and
//! never stops the rest of the scan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CatalogError, ErrorKind, SkillError};
use crate::models::{FolderDiagnostic, ScanReport, SkipReason};
use crate::parser::SkillParser;

/// Exact (case-sensitive) name of a skill definition file.
pub const SKILL_FILE_NAME: &str = "SKILL.md";

/// Folder names that never hold skills.
pub const RESERVED_FOLDERS: [&str; 14] = [
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    "node_modules",
    ".vscode",
    ".idea",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "venv",
    ".venv",
    "env",
    ".env",
];

/// Name-based admissibility rules for a direct child of the root.
///
/// Checked in order: hidden, private, reserved.
pub fn folder_skip_reason(name: &str) -> Option<SkipReason> {
    if name.starts_with('.') {
        Some(SkipReason::Hidden)
    } else if name.starts_with('_') {
        Some(SkipReason::Private)
    } else if RESERVED_FOLDERS.contains(&name) {
        Some(SkipReason::Reserved)
    } else {
        None
    }
}

/// Scans a skills root into a [`ScanReport`].
#[derive(Debug, Clone)]
pub struct SkillScanner {
    root: PathBuf,
}

impl SkillScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            root: fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()),
        }
    }

    /// Canonicalized root, when it existed at construction time.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and parse every admissible folder.
    pub fn scan(&self) -> Result<ScanReport, CatalogError> {
        let root = self.check_root()?;
        let parser = SkillParser::new(&root);
        info!("Scanning skills directory: {:?}", root);

        let mut report = ScanReport::new(&root);
        let mut admissible = 0usize;

        let walker = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    warn!("Failed to read entry {:?}: {}", path, e);
                    report.record(FolderDiagnostic::failed(&path, ErrorKind::IoRead, e.to_string()));
                    continue;
                }
            };

            let path = entry.path();
            let name = entry.file_name().to_string_lossy();

            if !path.is_dir() {
                if name == SKILL_FILE_NAME {
                    let detail = match parser.validate_folder_structure(path) {
                        Err(e) => e.to_string(),
                        Ok(()) => format!("{SKILL_FILE_NAME} must be inside a skill folder"),
                    };
                    warn!("Ignoring {} in the skills root: {:?}", SKILL_FILE_NAME, path);
                    report.record(FolderDiagnostic::skipped(path, SkipReason::RootFile, detail));
                }
                continue;
            }

            if let Some(reason) = folder_skip_reason(&name) {
                debug!("Skipping {} folder: {}", reason, name);
                report.record(FolderDiagnostic::skipped(path, reason, skip_detail(reason, &name)));
                continue;
            }

            let skill_file = path.join(SKILL_FILE_NAME);
            if !skill_file.is_file() {
                let detail = missing_file_detail(path);
                warn!("Skipping folder without {}: {}", SKILL_FILE_NAME, name);
                report.record(FolderDiagnostic::skipped(path, SkipReason::MissingFile, detail));
                continue;
            }

            admissible += 1;
            match parser.parse(&skill_file) {
                Ok(skill) => {
                    if let Some(existing) = report.find(&skill.name) {
                        let err = SkillError::validation(
                            &skill_file,
                            vec![format!(
                                "Duplicate skill name '{}': already defined by folder '{}', ignoring folder '{}'",
                                skill.name,
                                existing.folder_name().unwrap_or_default(),
                                name
                            )],
                        );
                        warn!("{}", err);
                        report.record(FolderDiagnostic::failed(path, err.kind(), err.to_string()));
                        continue;
                    }
                    info!("Loaded skill: {} (folder: {})", skill.name, name);
                    report.record_loaded(skill);
                }
                Err(e) => {
                    warn!("Failed to load skill from {}: {}", name, e);
                    report.record(FolderDiagnostic::failed(path, e.kind(), e.to_string()));
                }
            }
        }

        if admissible == 0 {
            warn!("No skill folders found in {:?}", root);
            return Err(CatalogError::NoSkillFolders {
                root,
                skipped: report.stats.skipped,
            });
        }

        info!(
            "Scan complete: {} loaded, {} skipped, {} failed",
            report.stats.loaded, report.stats.skipped, report.stats.failed
        );
        Ok(report)
    }

    /// Same as [`scan`](Self::scan), on tokio's blocking pool.
    pub async fn scan_async(&self) -> Result<ScanReport, CatalogError> {
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| CatalogError::Task(e.to_string()))?
    }

    fn check_root(&self) -> Result<PathBuf, CatalogError> {
        let root = &self.root;
        let meta = fs::metadata(root).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => CatalogError::RootMissing(root.clone()),
            _ => CatalogError::Io {
                path: root.clone(),
                source,
            },
        })?;
        if !meta.is_dir() {
            return Err(CatalogError::RootNotDirectory(root.clone()));
        }
        fs::read_dir(root).map_err(|source| CatalogError::Io {
            path: root.clone(),
            source,
        })?;
        // The root may have appeared after construction.
        Ok(fs::canonicalize(root).unwrap_or_else(|_| root.clone()))
    }
}

/// Scan `root` once.
pub fn scan(root: impl AsRef<Path>) -> Result<ScanReport, CatalogError> {
    SkillScanner::new(root).scan()
}

fn skip_detail(reason: SkipReason, name: &str) -> String {
    match reason {
        SkipReason::Hidden => format!("Hidden folder (starts with '.'): {name}"),
        SkipReason::Private => format!("Private folder (starts with '_'): {name}"),
        SkipReason::Reserved => format!("Reserved system folder: {name}"),
        SkipReason::MissingFile | SkipReason::RootFile => name.to_string(),
    }
}

fn missing_file_detail(folder: &Path) -> String {
    let variant = fs::read_dir(folder).ok().and_then(|entries| {
        entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .find(|n| n != SKILL_FILE_NAME && n.eq_ignore_ascii_case(SKILL_FILE_NAME))
    });
    match variant {
        Some(found) => format!(
            "No {SKILL_FILE_NAME} in {}; found '{found}', the file name is case-sensitive",
            folder.display()
        ),
        None => format!("No {SKILL_FILE_NAME} in {}", folder.display()),
    }
}
