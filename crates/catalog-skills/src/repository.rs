//! In-memory skill store with snapshot reads.
//!
//! Readers clone the current `Arc` under a short read lock and then work on
//! an immutable map, so a concurrent reload is observed either entirely or
//! not at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::error::SkillError;
use crate::models::{Skill, UNCATEGORIZED};
use crate::search::SkillQuery;

/// Immutable view of the repository at one instant.
pub type Snapshot = Arc<HashMap<String, Arc<Skill>>>;

/// What [`SkillRepository::add`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Updated,
    /// An identical skill was already stored.
    Unchanged,
}

/// Skills keyed by name.
#[derive(Debug, Default)]
pub struct SkillRepository {
    skills: RwLock<Snapshot>,
}

impl SkillRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from already-parsed skills.
    pub fn from_skills(skills: impl IntoIterator<Item = Skill>) -> Self {
        let repo = Self::new();
        repo.replace_all(skills);
        repo
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.skills.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.skills.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current immutable map.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.read())
    }

    /// Insert or replace a skill after running its self-check.
    pub fn add(&self, skill: Skill) -> Result<AddOutcome, SkillError> {
        skill
            .validate()
            .map_err(|problems| SkillError::validation(skill.definition_path(), problems))?;

        let mut guard = self.write();
        let outcome = match guard.get(&skill.name) {
            Some(existing) if **existing == skill => return Ok(AddOutcome::Unchanged),
            Some(_) => AddOutcome::Updated,
            None => AddOutcome::Inserted,
        };
        debug!("{:?} skill: {}", outcome, skill.name);
        Arc::make_mut(&mut guard).insert(skill.name.clone(), Arc::new(skill));
        Ok(outcome)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Skill>> {
        self.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Skill>> {
        let mut guard = self.write();
        if !guard.contains_key(name) {
            return None;
        }
        let removed = Arc::make_mut(&mut guard).remove(name);
        debug!("Removed skill: {}", name);
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Every skill, sorted by name.
    pub fn get_all(&self) -> Vec<Arc<Skill>> {
        sorted(self.snapshot().values().cloned())
    }

    /// Skills matching every criterion in `query`, sorted by name.
    pub fn search(&self, query: &SkillQuery) -> Vec<Arc<Skill>> {
        let snapshot = self.snapshot();
        sorted(
            snapshot
                .values()
                .filter(|skill| query.matches(skill))
                .cloned(),
        )
    }

    /// Skills grouped by category; skills without one go under `uncategorized`.
    pub fn group_by_category(&self) -> BTreeMap<String, Vec<Arc<Skill>>> {
        let mut groups: BTreeMap<String, Vec<Arc<Skill>>> = BTreeMap::new();
        for skill in self.get_all() {
            let category = skill
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            groups.entry(category).or_default().push(skill);
        }
        groups
    }

    /// Look up a skill by the basename of its folder.
    pub fn get_by_folder(&self, folder: &str) -> Option<Arc<Skill>> {
        self.read()
            .values()
            .find(|skill| skill.folder_name() == Some(folder))
            .cloned()
    }

    pub fn clear(&self) {
        *self.write() = Arc::new(HashMap::new());
        debug!("Cleared skill repository");
    }

    /// Swap in a complete new set of skills in one step.
    pub fn replace_all(&self, skills: impl IntoIterator<Item = Skill>) {
        let next: HashMap<String, Arc<Skill>> = skills
            .into_iter()
            .map(|skill| (skill.name.clone(), Arc::new(skill)))
            .collect();
        let count = next.len();
        *self.write() = Arc::new(next);
        info!("Skill repository now holds {} skills", count);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn sorted(skills: impl Iterator<Item = Arc<Skill>>) -> Vec<Arc<Skill>> {
    let mut out: Vec<_> = skills.collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}
