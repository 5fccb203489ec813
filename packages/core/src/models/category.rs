//! Category Data Structures
//!
//! This module defines the `Category` record stored in the `categories` table
//! and the input types used to create and edit categories.
//!
//! # Invariants
//!
//! - `level == 1` iff `parent_id` is `None`
//! - `level == parent.level + 1` for every non-root category
//! - `tree_path == parent.tree_path + parent.id + "/"` (roots have `"/"`)
//! - `1 <= level <= MAX_CATEGORY_DEPTH`
//! - `code` is globally unique
//!
//! # Examples
//!
//! ```rust
//! use qbank_core::models::{CategoryType, NewCategory};
//!
//! let subject = NewCategory::new("Mathematics", "MATH", CategoryType::Subject);
//! assert!(subject.validate().is_ok());
//!
//! let chapter = NewCategory::new("Algebra", "MATH-ALG", CategoryType::Chapter)
//!     .under(1)
//!     .allow_questions(false);
//! assert_eq!(chapter.parent_id, Some(1));
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Identifier of a category row (SQLite rowid)
pub type CategoryId = i64;

/// Hard ceiling on tree depth: a root is level 1, the deepest node level 6
pub const MAX_CATEGORY_DEPTH: i64 = 6;

/// Materialized path carried by every root category
pub const ROOT_TREE_PATH: &str = "/";

/// Maximum accepted length of a category code
pub const MAX_CODE_LENGTH: usize = 64;

/// Maximum accepted length of a category name
pub const MAX_NAME_LENGTH: usize = 255;

const CODE_PATTERN: &str = r"^[A-Z0-9_-]+$";

/// Validation errors for category input and stored representations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid category code '{code}': {reason}")]
    InvalidCode { code: String, reason: String },

    #[error("Invalid category name: {0}")]
    InvalidName(String),

    #[error("Invalid category type: {0}")]
    InvalidCategoryType(String),

    #[error("Invalid tree path '{0}'")]
    InvalidTreePath(String),
}

/// The role a category plays in the question bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryType {
    Subject,
    Chapter,
    Topic,
    Subtopic,
    Skill,
    Objective,
}

impl CategoryType {
    /// Stored string representation (matches the serde form)
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Subject => "SUBJECT",
            CategoryType::Chapter => "CHAPTER",
            CategoryType::Topic => "TOPIC",
            CategoryType::Subtopic => "SUBTOPIC",
            CategoryType::Skill => "SKILL",
            CategoryType::Objective => "OBJECTIVE",
        }
    }

    /// Conventional type for a given level (Subject at 1 ... Objective at 6)
    ///
    /// The engine does not enforce this mapping; it exists for callers that
    /// want default naming when building a tree.
    pub fn suggested_for_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(CategoryType::Subject),
            2 => Some(CategoryType::Chapter),
            3 => Some(CategoryType::Topic),
            4 => Some(CategoryType::Subtopic),
            5 => Some(CategoryType::Skill),
            6 => Some(CategoryType::Objective),
            _ => None,
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBJECT" => Ok(CategoryType::Subject),
            "CHAPTER" => Ok(CategoryType::Chapter),
            "TOPIC" => Ok(CategoryType::Topic),
            "SUBTOPIC" => Ok(CategoryType::Subtopic),
            "SKILL" => Ok(CategoryType::Skill),
            "OBJECTIVE" => Ok(CategoryType::Objective),
            other => Err(ValidationError::InvalidCategoryType(other.to_string())),
        }
    }
}

/// A node of the question-bank category tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    pub level: i64,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i64,
    pub tree_path: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub allow_questions: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Materialized path that every descendant of this category starts with
    pub fn subtree_prefix(&self) -> String {
        crate::services::path_calculator::PathCalculator::compute_path(
            &self.tree_path,
            Some(self.id),
        )
    }
}

/// Input for `TreeMutator::create_category`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    #[serde(default = "default_allow_questions")]
    pub allow_questions: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_allow_questions() -> bool {
    true
}

impl NewCategory {
    /// Create a root-level category input; use `under()` to attach a parent
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        category_type: CategoryType,
    ) -> Self {
        Self {
            parent_id: None,
            name: name.into(),
            code: code.into(),
            category_type,
            allow_questions: true,
            description: None,
        }
    }

    pub fn under(mut self, parent_id: CategoryId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn allow_questions(mut self, allow: bool) -> Self {
        self.allow_questions = allow;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate name and code, returning their trimmed forms
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let name = validate_category_name(&self.name)?;
        let code = validate_category_code(&self.code)?;
        Ok((name, code))
    }
}

/// Sparse update of the non-structural fields of a category
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub allow_questions: Option<bool>,
}

impl CategoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.is_active.is_none()
            && self.allow_questions.is_none()
    }
}

/// Validate a category name and return it trimmed
pub fn validate_category_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("name".to_string()));
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName(format!(
            "name exceeds {} characters",
            MAX_NAME_LENGTH
        )));
    }

    Ok(trimmed.to_string())
}

/// Validate a category code and return it trimmed
///
/// Codes are upper-case alphanumerics plus `-` and `_`. Lower-case input is
/// rejected rather than normalized so that stored codes always match what the
/// caller sent.
///
/// # Examples
///
/// ```
/// use qbank_core::models::validate_category_code;
///
/// assert!(validate_category_code("MATH-ALG_01").is_ok());
/// assert!(validate_category_code("math").is_err());
/// assert!(validate_category_code("").is_err());
/// ```
pub fn validate_category_code(code: &str) -> Result<String, ValidationError> {
    static CODE_REGEX: OnceLock<Regex> = OnceLock::new();
    let code_regex = CODE_REGEX.get_or_init(|| Regex::new(CODE_PATTERN).unwrap());

    let trimmed = code.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("code".to_string()));
    }

    if trimmed.len() > MAX_CODE_LENGTH {
        return Err(ValidationError::InvalidCode {
            code: trimmed.to_string(),
            reason: format!("exceeds {} characters", MAX_CODE_LENGTH),
        });
    }

    if !code_regex.is_match(trimmed) {
        return Err(ValidationError::InvalidCode {
            code: trimmed.to_string(),
            reason: "only A-Z, 0-9, '-' and '_' are allowed".to_string(),
        });
    }

    Ok(trimmed.to_string())
}
