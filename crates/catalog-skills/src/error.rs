//! Error taxonomy for skill ingestion.
//!
//! [`SkillError`] covers a single definition file and always carries the
//! offending path, so a scan can report exactly which folder is broken.
//! [`CatalogError`] covers conditions that affect the whole catalog.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Failure to turn one definition file into a skill.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// File is not at the required depth or location.
    #[error("Invalid folder structure for {}:\n  {message}", path.display())]
    Structure { path: PathBuf, message: String },

    /// Missing or malformed metadata delimiters.
    #[error("Invalid SKILL.md format in {}:\n  {message}", path.display())]
    Format { path: PathBuf, message: String },

    /// Metadata block is not a valid YAML mapping.
    #[error("Failed to decode metadata in {}:\n  {message}", path.display())]
    Decode { path: PathBuf, message: String },

    /// Required keys missing, bad enum value, or failed self-check.
    #[error("Skill validation failed for {}:\n{}", path.display(), bullet_list(problems))]
    Validation { path: PathBuf, problems: Vec<String> },

    /// File could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SkillError {
    pub fn structure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Structure {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn decode(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn validation(path: impl Into<PathBuf>, problems: Vec<String>) -> Self {
        Self::Validation {
            path: path.into(),
            problems,
        }
    }

    /// Classification used in scan diagnostics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Structure { .. } => ErrorKind::Structure,
            Self::Format { .. } => ErrorKind::Format,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::IoRead { .. } => ErrorKind::IoRead,
        }
    }

    /// The file or folder the error is about.
    pub fn path(&self) -> &Path {
        match self {
            Self::Structure { path, .. }
            | Self::Format { path, .. }
            | Self::Decode { path, .. }
            | Self::Validation { path, .. }
            | Self::IoRead { path, .. } => path,
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serializable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Structure,
    Format,
    Decode,
    Validation,
    IoRead,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Format => "format",
            Self::Decode => "decode",
            Self::Validation => "validation",
            Self::IoRead => "io_read",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize the file watcher.
    #[error("Failed to setup watcher: {0}")]
    Setup(String),

    /// Failed to watch a specific path.
    #[error("Failed to watch path: {0}")]
    Watch(String),

    /// The backend reported an error while running.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Conditions that affect the catalog as a whole rather than one folder.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(
        "Skills directory does not exist: {}\n  Create it and add one folder per skill: {}/<skill-name>/SKILL.md",
        .0.display(),
        .0.display()
    )]
    RootMissing(PathBuf),

    #[error("Skills path is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error(
        "No skill folders found in {} ({skipped} entries skipped)\n  Expected structure:\n    {}/\n    ├── my-skill/\n    │   └── SKILL.md\n    └── another-skill/\n        └── SKILL.md",
        root.display(),
        root.display()
    )]
    NoSkillFolders { root: PathBuf, skipped: usize },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Scan task failed: {0}")]
    Task(String),
}

impl CatalogError {
    /// True when the root exists but holds no skill folders.
    pub fn is_empty_root(&self) -> bool {
        matches!(self, Self::NoSkillFolders { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = SkillError::structure("/skills/SKILL.md", "must be inside a folder");
        let msg = err.to_string();
        assert!(msg.contains("/skills/SKILL.md"));
        assert!(msg.contains("must be inside a folder"));
        assert_eq!(err.kind(), ErrorKind::Structure);
        assert_eq!(err.path(), Path::new("/skills/SKILL.md"));
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let err = SkillError::validation(
            "/skills/a/SKILL.md",
            vec!["missing name".into(), "missing description".into()],
        );
        let msg = err.to_string();
        assert!(msg.contains("  - missing name"));
        assert!(msg.contains("  - missing description"));
    }

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::IoRead.to_string(), "io_read");
        assert_eq!(
            serde_json::to_string(&ErrorKind::Decode).unwrap(),
            "\"decode\""
        );
    }

    #[test]
    fn test_empty_root_is_distinct() {
        let err = CatalogError::NoSkillFolders {
            root: PathBuf::from("/skills"),
            skipped: 2,
        };
        assert!(err.is_empty_root());
        assert!(err.to_string().contains("SKILL.md"));
        assert!(!CatalogError::RootMissing(PathBuf::from("/x")).is_empty_root());
    }
}
