//! Skill ingestion for skill-catalog.
//!
//! Turns a directory of `<root>/<skill>/SKILL.md` files into an in-memory,
//! queryable catalog and keeps it current as files change.

pub mod error;
pub mod models;
pub mod parser;
pub mod repository;
pub mod scanner;
pub mod search;
pub mod watcher;

pub use error::{CatalogError, ErrorKind, SkillError, WatchError};
pub use models::{
    Complexity, Dependencies, DiagnosticOutcome, FolderDiagnostic, ScanReport, ScanStats, Skill,
    SkipReason, UNCATEGORIZED,
};
pub use parser::{name_style_warning, parse_str, SkillParser, FRONTMATTER_DELIMITER};
pub use repository::{AddOutcome, SkillRepository, Snapshot};
pub use scanner::{folder_skip_reason, scan, SkillScanner, RESERVED_FOLDERS, SKILL_FILE_NAME};
pub use search::SkillQuery;
pub use watcher::{
    is_relevant, is_skill_folder, reload_snapshot, ReloadCallback, ReloadSummary, SkillWatcher,
    WatchOptions,
};
