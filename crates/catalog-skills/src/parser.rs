//! `SKILL.md` parsing: folder-structure checks, metadata split, YAML decode.
//!
//! A definition file looks like:
//!
//! ```text
//! ---
//! name: excel-advanced
//! description: Advanced Excel automation
//! tags: [excel, automation]
//! dependencies:
//!   python: [openpyxl]
//! ---
//! # Excel Advanced
//! ...
//! ```
//!
//! The file must live at `<root>/<skill-folder>/SKILL.md`; anything else is
//! rejected before the file is even read.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::error::SkillError;
use crate::models::{Complexity, Dependencies, Skill, SkipReason, UNCATEGORIZED};
use crate::scanner::folder_skip_reason;
use crate::SKILL_FILE_NAME;

/// Line that opens and closes the metadata block.
pub const FRONTMATTER_DELIMITER: &str = "---";

const FORMAT_EXAMPLE: &str =
    "Expected a metadata block between '---' lines at the top of the file:\n    ---\n    name: my-skill\n    description: What the skill does\n    ---\n    # Content here";

/// Parser bound to one skills root.
#[derive(Debug, Clone)]
pub struct SkillParser {
    root: PathBuf,
}

impl SkillParser {
    /// Create a parser for skills under `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: canonical_or_given(root.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that `path` is `<root>/<admissible-folder>/SKILL.md`.
    pub fn validate_folder_structure(&self, path: &Path) -> Result<(), SkillError> {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name != SKILL_FILE_NAME {
            return Err(SkillError::structure(
                path,
                format!(
                    "Skill file must be named '{}', got: '{}'",
                    SKILL_FILE_NAME, file_name
                ),
            ));
        }

        let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Err(SkillError::structure(
                path,
                format!(
                    "{} must be inside a skill folder: {}/<skill-name>/{}",
                    SKILL_FILE_NAME,
                    self.root.display(),
                    SKILL_FILE_NAME
                ),
            ));
        };
        let folder = canonical_or_given(parent);

        if folder == self.root {
            return Err(SkillError::structure(
                path,
                format!(
                    "{file} cannot be in the root skills directory.\n  Each skill must be in its own dedicated folder:\n    ✓ {root}/my-skill/{file}\n    ✗ {root}/{file}",
                    file = SKILL_FILE_NAME,
                    root = self.root.display()
                ),
            ));
        }

        if folder.parent() != Some(self.root.as_path()) {
            return Err(SkillError::structure(
                path,
                format!(
                    "Skill folders must be direct children of the skills directory.\n  Skills dir: {}\n  Skill folder: {}\n  Expected structure: {}/<skill-name>/{}\n  Skills nested more than 1 level deep are not supported.",
                    self.root.display(),
                    folder.display(),
                    self.root.display(),
                    SKILL_FILE_NAME
                ),
            ));
        }

        let folder_name = folder.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if let Some(reason) = folder_skip_reason(folder_name) {
            let message = match reason {
                SkipReason::Hidden => format!(
                    "Hidden skill folders (starting with '.') are not allowed: {folder_name}"
                ),
                SkipReason::Private => format!(
                    "Private skill folders (starting with '_') are not allowed: {folder_name}"
                ),
                _ => format!(
                    "Reserved system folders cannot hold skills: {folder_name}\n  Reserved: {}",
                    crate::scanner::RESERVED_FOLDERS.join(", ")
                ),
            };
            return Err(SkillError::structure(path, message));
        }

        if !folder.is_dir() {
            return Err(SkillError::structure(
                path,
                format!(
                    "Skill folder does not exist or is not a directory: {}",
                    folder.display()
                ),
            ));
        }

        Ok(())
    }

    /// Parse one definition file into a validated [`Skill`].
    pub fn parse(&self, path: &Path) -> Result<Skill, SkillError> {
        self.validate_folder_structure(path)?;

        let content = fs::read_to_string(path).map_err(|source| SkillError::IoRead {
            path: path.to_path_buf(),
            source,
        })?;

        // validate_folder_structure guarantees a parent.
        let folder = canonical_or_given(path.parent().unwrap_or(path));
        let skill = parse_str(&content, &folder)?;

        skill
            .validate()
            .map_err(|problems| SkillError::validation(path, problems))?;

        if let Some(warning) = name_style_warning(&skill.name) {
            warn!("Skill '{}' in folder {}: {}", skill.name, folder.display(), warning);
        }

        debug!(
            "Parsed skill '{}' from folder '{}'",
            skill.name,
            skill.folder_name().unwrap_or_default()
        );
        Ok(skill)
    }
}

fn canonical_or_given(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// ── Decoding ────────────────────────────────────────────────────────────

/// Decode definition-file text for a skill living in `folder`.
///
/// Does not touch the filesystem; the entity self-check is left to the caller.
pub fn parse_str(content: &str, folder: &Path) -> Result<Skill, SkillError> {
    let file = folder.join(SKILL_FILE_NAME);

    let (block, body) = split_frontmatter(content)
        .map_err(|message| SkillError::format(&file, format!("{message}\n  {FORMAT_EXAMPLE}")))?;

    let raw = decode_block(block)
        .map_err(|message| SkillError::decode(&file, format!("{message}\n  {FORMAT_EXAMPLE}")))?;

    let mut problems = Vec::new();

    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    if name.is_none() {
        problems.push(format!(
            "Missing required field 'name' in folder '{}'\n    Add 'name: your-skill-name' to the metadata block",
            folder_label(folder)
        ));
    }

    let description = raw.description.filter(|d| !d.trim().is_empty());
    if description.is_none() {
        problems.push(format!(
            "Missing required field 'description' in folder '{}'\n    Add 'description: Brief description' to the metadata block",
            folder_label(folder)
        ));
    }

    let complexity = match raw.complexity.as_deref().map(str::parse::<Complexity>) {
        Some(Ok(c)) => Some(c),
        Some(Err(message)) => {
            problems.push(message);
            None
        }
        None => None,
    };

    let (Some(name), Some(description)) = (name, description) else {
        return Err(SkillError::validation(file, problems));
    };
    if !problems.is_empty() {
        return Err(SkillError::validation(file, problems));
    }

    Ok(Skill {
        name,
        description,
        version: raw.version,
        author: raw.author,
        created: raw.created,
        updated: raw.updated,
        dependencies: raw.dependencies,
        category: raw.category,
        tags: raw.tags.into_iter().collect(),
        complexity,
        when_to_use: raw.when_to_use,
        related_skills: raw.related_skills,
        has_examples: raw.has_examples,
        example_files: raw.example_files,
        folder_path: folder.to_path_buf(),
        body: body.to_string(),
    })
}

fn folder_label(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

/// Split content into (metadata block, body).
///
/// The first line must be the delimiter; the block ends at the next line
/// that is only the delimiter. Everything after that line is the body.
fn split_frontmatter(content: &str) -> Result<(&str, &str), String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');

    let first = lines.next().unwrap_or("");
    if !is_delimiter(first) {
        return Err(format!(
            "{SKILL_FILE_NAME} must start with a '{FRONTMATTER_DELIMITER}' line opening the metadata block"
        ));
    }

    let start = first.len();
    let mut offset = start;
    for line in lines {
        if is_delimiter(line) {
            return Ok((&content[start..offset], &content[offset + line.len()..]));
        }
        offset += line.len();
    }

    Err(format!(
        "Metadata block is not closed: missing a second '{FRONTMATTER_DELIMITER}' line"
    ))
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == FRONTMATTER_DELIMITER
}

/// Metadata keys we understand. Anything else in the block is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFrontmatter {
    #[serde(deserialize_with = "scalar")]
    name: Option<String>,
    #[serde(deserialize_with = "scalar")]
    description: Option<String>,
    #[serde(deserialize_with = "scalar")]
    version: Option<String>,
    #[serde(deserialize_with = "scalar")]
    author: Option<String>,
    #[serde(deserialize_with = "scalar")]
    created: Option<String>,
    #[serde(deserialize_with = "scalar")]
    updated: Option<String>,
    #[serde(deserialize_with = "dependencies")]
    dependencies: Dependencies,
    #[serde(deserialize_with = "scalar")]
    category: Option<String>,
    #[serde(deserialize_with = "string_list")]
    tags: Vec<String>,
    #[serde(deserialize_with = "scalar")]
    complexity: Option<String>,
    #[serde(deserialize_with = "string_list")]
    when_to_use: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    related_skills: Vec<String>,
    #[serde(deserialize_with = "flag")]
    has_examples: bool,
    #[serde(deserialize_with = "string_list")]
    example_files: Vec<String>,
}

fn decode_block(block: &str) -> Result<RawFrontmatter, String> {
    let value: Value = serde_yaml::from_str(block)
        .map_err(|e| format!("Invalid YAML in metadata block: {e}"))?;

    match value {
        Value::Null => Ok(RawFrontmatter::default()),
        Value::Mapping(mut map) => {
            // Keys such as `2024:` or `true:` are never field names.
            map.retain(|key, _| key.is_string());
            serde_yaml::from_value(Value::Mapping(map))
                .map_err(|e| format!("Invalid metadata value: {e}"))
        }
        other => Err(format!(
            "Metadata block must be a mapping of keys to values, got {}",
            value_kind(&other)
        )),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Strings, integers and booleans read as text; decimals must be quoted
/// (`version: '1.10'`) because YAML would reparse them as floats.
fn scalar_to_string(value: Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) if n.is_f64() => Err(format!(
            "decimal number {n} cannot be kept as written; quote it (e.g. '{n}')"
        )),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(format!("expected a string, got {}", value_kind(&other))),
    }
}

fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(value).map_err(D::Error::custom)
}

fn items_to_strings(value: Value) -> Result<Vec<String>, String> {
    match value {
        Value::Sequence(items) => items
            .into_iter()
            .filter_map(|item| scalar_to_string(item).transpose())
            .collect(),
        other => Ok(scalar_to_string(other)?.into_iter().collect()),
    }
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    items_to_strings(value).map_err(D::Error::custom)
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        other => Err(D::Error::custom(format!(
            "expected true or false, got {}",
            value_kind(&other)
        ))),
    }
}

/// Flat list → `uncategorized` bucket; mapping → one bucket per ecosystem.
fn dependencies<'de, D>(deserializer: D) -> Result<Dependencies, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    normalize_dependencies(value).map_err(D::Error::custom)
}

fn normalize_dependencies(value: Value) -> Result<Dependencies, String> {
    let mut deps = Dependencies::new();
    match value {
        Value::Null => {}
        Value::Mapping(map) => {
            for (ecosystem, requirements) in map {
                let ecosystem = scalar_to_string(ecosystem)?
                    .ok_or_else(|| "dependency ecosystem name cannot be empty".to_string())?;
                let requirements = items_to_strings(requirements)?;
                deps.entry(ecosystem).or_default().extend(requirements);
            }
        }
        other => {
            let flat = items_to_strings(other)?;
            if !flat.is_empty() {
                deps.insert(UNCATEGORIZED.to_string(), flat);
            }
        }
    }
    Ok(deps)
}

// ── Rendering ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FrontmatterOut<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<&'a str>,
    #[serde(skip_serializing_if = "no_dependencies")]
    dependencies: &'a Dependencies,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    complexity: Option<Complexity>,
    #[serde(skip_serializing_if = "empty_list")]
    when_to_use: &'a [String],
    #[serde(skip_serializing_if = "empty_list")]
    related_skills: &'a [String],
    #[serde(skip_serializing_if = "is_false")]
    has_examples: bool,
    #[serde(skip_serializing_if = "empty_list")]
    example_files: &'a [String],
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn empty_list(items: &&[String]) -> bool {
    items.is_empty()
}

fn no_tags(tags: &&BTreeSet<String>) -> bool {
    tags.is_empty()
}

fn no_dependencies(deps: &&Dependencies) -> bool {
    deps.is_empty()
}

pub(crate) fn render_document(skill: &Skill) -> Result<String, serde_yaml::Error> {
    let out = FrontmatterOut {
        name: &skill.name,
        description: &skill.description,
        version: skill.version.as_deref(),
        author: skill.author.as_deref(),
        created: skill.created.as_deref(),
        updated: skill.updated.as_deref(),
        dependencies: &skill.dependencies,
        category: skill.category.as_deref(),
        tags: &skill.tags,
        complexity: skill.complexity,
        when_to_use: &skill.when_to_use,
        related_skills: &skill.related_skills,
        has_examples: skill.has_examples,
        example_files: &skill.example_files,
    };
    let yaml = serde_yaml::to_string(&out)?;
    Ok(format!(
        "{FRONTMATTER_DELIMITER}\n{yaml}{FRONTMATTER_DELIMITER}\n{}",
        skill.body
    ))
}

// ── Name style ──────────────────────────────────────────────────────────

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").ok())
        .as_ref()
}

/// Style advice for a skill name, if any. Never a hard failure.
pub fn name_style_warning(name: &str) -> Option<String> {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Some("skill names should not start with a number".into());
    }
    if let Some(pattern) = name_pattern() {
        if !pattern.is_match(name) {
            return Some(
                "skill names should only contain letters, numbers, hyphens, and underscores".into(),
            );
        }
    }
    if name != name.to_lowercase() {
        return Some("skill names should be lowercase".into());
    }
    None
}
