//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::catalog::category_of;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("categories[{0}].category is required")]
    MissingCategoryName(usize),
    #[error("category '{0}' is declared more than once")]
    DuplicateCategory(String),
    #[error("category '{category}' lists feature subject '{subject}' from another category")]
    ForeignFeature { category: String, subject: String },
    #[error("catalog.snapshot_path parent directory does not exist: {0}")]
    SnapshotPathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, meta) in config.categories.iter().enumerate() {
        if meta.category.trim().is_empty() {
            errors.push(ValidationError::MissingCategoryName(i));
            continue;
        }
        if !seen.insert(meta.category.as_str()) {
            errors.push(ValidationError::DuplicateCategory(meta.category.clone()));
        }

        for feature in meta.static_features.iter().chain(&meta.hidden_features) {
            if category_of(&feature.subject) != meta.category {
                errors.push(ValidationError::ForeignFeature {
                    category: meta.category.clone(),
                    subject: feature.subject.clone(),
                });
            }
        }
    }

    if let Some(ref path) = config.catalog.snapshot_path
        && let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::SnapshotPathInvalid(
            path.display().to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
