//! Query filters for the skill repository.

use crate::models::{Complexity, Skill};

/// Conjunctive filter over skills. Unset criteria match everything.
///
/// ```
/// use catalog_skills::SkillQuery;
///
/// let query = SkillQuery::new().tag("excel").category("data-analysis");
/// assert!(!query.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillQuery {
    /// Case-insensitive substring of name or description.
    pub query: Option<String>,
    /// Exact category match.
    pub category: Option<String>,
    /// Tag membership.
    pub tag: Option<String>,
    pub complexity: Option<Complexity>,
}

impl SkillQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-text filter. An empty string is treated as absent.
    pub fn text(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// True when no criteria are set.
    pub fn is_empty(&self) -> bool {
        self.text_filter().is_none()
            && self.category.is_none()
            && self.tag.is_none()
            && self.complexity.is_none()
    }

    /// Whether `skill` satisfies every criterion.
    pub fn matches(&self, skill: &Skill) -> bool {
        if let Some(query) = self.text_filter() {
            let needle = query.to_lowercase();
            if !skill.name.to_lowercase().contains(&needle)
                && !skill.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }

        if let Some(category) = &self.category {
            if skill.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }

        if let Some(tag) = &self.tag {
            if !skill.has_tag(tag) {
                return false;
            }
        }

        if let Some(complexity) = self.complexity {
            if skill.complexity != Some(complexity) {
                return false;
            }
        }

        true
    }

    fn text_filter(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }
}
