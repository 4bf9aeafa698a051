//! Core data models for the skill catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::error::ErrorKind;
use crate::SKILL_FILE_NAME;

/// Bucket for flat dependency lists and skills without a category.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Requirement strings grouped by ecosystem (e.g. "python", "system").
pub type Dependencies = BTreeMap<String, Vec<String>>;

// ── Complexity ──────────────────────────────────────────────────────────

/// Declared difficulty level of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Beginner,
    Intermediate,
    Advanced,
}

impl Complexity {
    pub const ALL: [Complexity; 3] = [Self::Beginner, Self::Intermediate, Self::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                format!("Complexity must be 'beginner', 'intermediate', or 'advanced', got: {s:?}")
            })
    }
}

// ── Skill ───────────────────────────────────────────────────────────────

/// A skill loaded from `<root>/<folder>/SKILL.md`.
///
/// Values are immutable once built; an update replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Unique key, trimmed and non-empty.
    pub name: String,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,

    /// Ecosystem name → requirement strings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: Dependencies,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when_to_use: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_skills: Vec<String>,

    #[serde(default)]
    pub has_examples: bool,

    /// Paths relative to `folder_path`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub example_files: Vec<String>,

    /// Absolute path of the owning folder.
    pub folder_path: PathBuf,

    /// Document text after the metadata block.
    pub body: String,
}

impl Skill {
    /// Minimal skill with only the required fields set.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        folder_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: None,
            author: None,
            created: None,
            updated: None,
            dependencies: Dependencies::new(),
            category: None,
            tags: BTreeSet::new(),
            complexity: None,
            when_to_use: Vec::new(),
            related_skills: Vec::new(),
            has_examples: false,
            example_files: Vec::new(),
            folder_path: folder_path.into(),
            body: String::new(),
        }
    }

    /// Resource URI, `skill://<name>`.
    pub fn uri(&self) -> String {
        format!("skill://{}", self.name)
    }

    /// Basename of the owning folder.
    pub fn folder_name(&self) -> Option<&str> {
        self.folder_path.file_name().and_then(|n| n.to_str())
    }

    /// Path of the definition file this skill was parsed from.
    pub fn definition_path(&self) -> PathBuf {
        self.folder_path.join(SKILL_FILE_NAME)
    }

    /// Full path of an example file.
    pub fn example_path(&self, relative: &str) -> PathBuf {
        self.folder_path.join(relative)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Render back into a `SKILL.md` document.
    pub fn to_document(&self) -> Result<String, serde_yaml::Error> {
        crate::parser::render_document(self)
    }

    /// Entity self-check. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("Skill name is required".to_string());
        } else if self.name.trim() != self.name {
            problems.push(format!(
                "Skill name must not have surrounding whitespace: {:?}",
                self.name
            ));
        }

        if self.description.trim().is_empty() {
            problems.push("Skill description is required".to_string());
        }

        let folder_ok = if !self.folder_path.is_absolute() {
            problems.push(format!(
                "Skill folder path must be absolute: {}",
                self.folder_path.display()
            ));
            false
        } else if self.folder_path.file_name().is_none() {
            problems.push(format!(
                "Skill folder path must name a folder: {}",
                self.folder_path.display()
            ));
            false
        } else if !self.folder_path.is_dir() {
            problems.push(format!(
                "Skill folder not found or not a directory: {}\n    Each skill must be in its own folder.",
                self.folder_path.display()
            ));
            false
        } else {
            true
        };

        if self.has_examples && self.example_files.is_empty() {
            problems.push("has_examples is true but no example_files are listed".to_string());
        }

        if folder_ok {
            for example in &self.example_files {
                if let Err(problem) = check_example_file(&self.folder_path, example) {
                    problems.push(problem);
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// An example file must exist and stay inside its skill folder.
fn check_example_file(folder: &Path, relative: &str) -> Result<(), String> {
    let rel = Path::new(relative);
    if relative.trim().is_empty() {
        return Err("Example file entry is empty".to_string());
    }
    if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::Prefix(_))) {
        return Err(format!(
            "Example file must be relative to the skill folder: {relative}"
        ));
    }

    let joined = folder.join(rel);
    let resolved = std::fs::canonicalize(&joined)
        .map_err(|_| format!("Example file not found: {}", joined.display()))?;
    let base = std::fs::canonicalize(folder).unwrap_or_else(|_| folder.to_path_buf());
    if !resolved.starts_with(&base) || resolved == base {
        return Err(format!(
            "Example file must stay inside the skill folder {}: {relative}",
            folder.display()
        ));
    }
    Ok(())
}

// ── Scan results ────────────────────────────────────────────────────────

/// Per-scan counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Why a directory entry did not contribute a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Name starts with `.`.
    Hidden,
    /// Name starts with `_`.
    Private,
    /// Name is on the reserved deny-list.
    Reserved,
    /// No `SKILL.md` directly inside.
    MissingFile,
    /// A `SKILL.md` lying directly in the root.
    RootFile,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Private => "private",
            Self::Reserved => "reserved",
            Self::MissingFile => "missing-file",
            Self::RootFile => "root-file",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one skipped or failed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DiagnosticOutcome {
    Skipped { reason: SkipReason, detail: String },
    Failed { kind: ErrorKind, message: String },
}

/// Human-readable record for a folder that did not load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDiagnostic {
    pub path: PathBuf,
    /// Basename of `path`.
    pub folder: String,
    #[serde(flatten)]
    pub outcome: DiagnosticOutcome,
}

impl FolderDiagnostic {
    pub fn skipped(path: &Path, reason: SkipReason, detail: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            folder: basename(path),
            outcome: DiagnosticOutcome::Skipped {
                reason,
                detail: detail.into(),
            },
        }
    }

    pub fn failed(path: &Path, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            folder: basename(path),
            outcome: DiagnosticOutcome::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match &self.outcome {
            DiagnosticOutcome::Skipped { reason, .. } => Some(*reason),
            DiagnosticOutcome::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            DiagnosticOutcome::Failed { kind, .. } => Some(*kind),
            DiagnosticOutcome::Skipped { .. } => None,
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Result of one full pass over the skills root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub root: PathBuf,

    /// Loaded skills keyed by name.
    pub skills: BTreeMap<String, Skill>,

    pub stats: ScanStats,

    /// One entry per skipped or failed folder, in directory order.
    #[serde(default)]
    pub diagnostics: Vec<FolderDiagnostic>,

    pub scanned_at: DateTime<Utc>,
}

impl ScanReport {
    /// Create an empty report for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skills: BTreeMap::new(),
            stats: ScanStats::default(),
            diagnostics: Vec::new(),
            scanned_at: Utc::now(),
        }
    }

    /// Find a skill by name.
    pub fn find(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }

    /// Skip reasons in directory order.
    pub fn skip_reasons(&self) -> Vec<SkipReason> {
        self.diagnostics
            .iter()
            .filter_map(FolderDiagnostic::skip_reason)
            .collect()
    }

    pub(crate) fn record_loaded(&mut self, skill: Skill) {
        self.stats.loaded += 1;
        self.skills.insert(skill.name.clone(), skill);
    }

    pub(crate) fn record(&mut self, diagnostic: FolderDiagnostic) {
        match diagnostic.outcome {
            DiagnosticOutcome::Skipped { .. } => self.stats.skipped += 1,
            DiagnosticOutcome::Failed { .. } => self.stats.failed += 1,
        }
        self.diagnostics.push(diagnostic);
    }
}
