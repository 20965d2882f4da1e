/*
    validator.rs - Text and tag validation

    Validates user-supplied text before it reaches the store.
    Ensures:
    - Username/password/title/content/comment lengths within configured bounds
    - Tag lists normalized (trimmed, lower-cased, deduplicated) with 1..=max_tags entries

    Lengths are counted in characters, not bytes.
*/

use std::collections::BTreeSet;

use crate::config::LimitsConfig;
use crate::core_store::store::errors::ValidationError;

/// Validates text fields against the configured limits
#[derive(Debug, Clone)]
pub struct TextValidator {
    limits: LimitsConfig,
}

impl TextValidator {
    pub fn new(limits: LimitsConfig) -> Self {
        TextValidator { limits }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn validate_username(&self, username: &str) -> Result<(), ValidationError> {
        if username.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidField {
                field: "username",
                reason: "must not contain whitespace".to_string(),
            });
        }
        check_length("username", username, self.limits.username_max)
    }

    pub fn validate_password(&self, password: &str) -> Result<(), ValidationError> {
        if password.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidField {
                field: "password",
                reason: "must not contain whitespace".to_string(),
            });
        }
        check_length("password", password, self.limits.password_max)
    }

    pub fn validate_title(&self, title: &str) -> Result<(), ValidationError> {
        check_length("title", title, self.limits.title_max)
    }

    pub fn validate_content(&self, content: &str) -> Result<(), ValidationError> {
        check_length("content", content, self.limits.content_max)
    }

    pub fn validate_comment(&self, comment: &str) -> Result<(), ValidationError> {
        check_length("comment", comment, self.limits.comment_max)
    }

    /// Normalize a raw tag list and check its size
    pub fn normalize_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<BTreeSet<String>, ValidationError> {
        let normalized: BTreeSet<String> = tags
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        if normalized.is_empty() || normalized.len() > self.limits.max_tags {
            return Err(ValidationError::InvalidField {
                field: "tags",
                reason: format!(
                    "between 1 and {} non-empty tags are required (got {})",
                    self.limits.max_tags,
                    normalized.len()
                ),
            });
        }
        Ok(normalized)
    }
}

impl Default for TextValidator {
    fn default() -> Self {
        TextValidator::new(LimitsConfig::default())
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual < 1 || actual > max {
        return Err(ValidationError::Length { field, min: 1, max, actual });
    }
    Ok(())
}
