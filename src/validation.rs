//! Input validation helpers
//!
//! Handlers collect all field errors of a request body in a [`Validator`]
//! and turn them into a single `ValidationFailed` error.

use chrono::{DateTime, Utc};

use crate::error::{FieldError, ServiceError, ServiceResult};

/// Entity names: table, category, menu item, package, department, etc.
pub const MAX_NAME_LEN: usize = 200;

/// Notes, descriptions, comments
pub const MAX_NOTE_LEN: usize = 2000;

/// Promotion codes, zones, usernames
pub const MAX_SHORT_TEXT_LEN: usize = 100;

/// Passwords (before hashing)
pub const MAX_PASSWORD_LEN: usize = 128;

/// Image urls
pub const MAX_URL_LEN: usize = 2048;

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, field: &str, error: &'static str) {
        self.errors.push(FieldError {
            field: field.to_owned(),
            error,
        });
    }

    /// Required string: non-empty after trimming and within the length limit.
    pub fn required_text(&mut self, field: &str, value: &str, max_len: usize) -> &mut Self {
        if value.trim().is_empty() {
            self.fail(field, "field_required");
        } else if value.chars().count() > max_len {
            self.fail(field, "field_too_long");
        }
        self
    }

    pub fn optional_text(
        &mut self,
        field: &str,
        value: Option<&str>,
        max_len: usize,
    ) -> &mut Self {
        if let Some(value) = value {
            if value.chars().count() > max_len {
                self.fail(field, "field_too_long");
            }
        }
        self
    }

    pub fn range(&mut self, field: &str, value: i64, min: i64, max: i64) -> &mut Self {
        if value < min || value > max {
            self.fail(field, "field_out_of_range");
        }
        self
    }

    pub fn non_empty<T>(&mut self, field: &str, values: &[T]) -> &mut Self {
        if values.is_empty() {
            self.fail(field, "field_empty_list");
        }
        self
    }

    /// Parses an optional RFC 3339 timestamp. Blank input counts as absent.
    pub fn optional_date(&mut self, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match DateTime::parse_from_rfc3339(value) {
            Ok(date) => Some(date.with_timezone(&Utc)),
            Err(_) => {
                self.fail(field, "field_invalid_date");
                None
            }
        }
    }

    /// Free-form check for rules the helpers above do not cover.
    pub fn check(&mut self, field: &str, ok: bool, error: &'static str) -> &mut Self {
        if !ok {
            self.fail(field, error);
        }
        self
    }

    pub fn finish(&mut self) -> ServiceResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(ServiceError::ValidationFailed(std::mem::take(&mut self.errors)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_input_passes() {
        let result = Validator::new()
            .required_text("name", "Table 1", MAX_NAME_LEN)
            .optional_text("zone", None, MAX_SHORT_TEXT_LEN)
            .range("seats", 4, 1, 100)
            .non_empty("items", &[1])
            .finish();
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn collects_every_field_error() {
        let result = Validator::new()
            .required_text("name", "   ", MAX_NAME_LEN)
            .optional_text("zone", Some(&"x".repeat(101)), MAX_SHORT_TEXT_LEN)
            .range("seats", 0, 1, 100)
            .non_empty::<u64>("items", &[])
            .finish();

        let Err(ServiceError::ValidationFailed(errors)) = result else {
            panic!("expected validation failure");
        };
        let found: Vec<(&str, &str)> = errors
            .iter()
            .map(|e| (e.field.as_str(), e.error))
            .collect();
        assert_eq!(
            found,
            vec![
                ("name", "field_required"),
                ("zone", "field_too_long"),
                ("seats", "field_out_of_range"),
                ("items", "field_empty_list"),
            ]
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let thai = "ข้าวผัด";
        assert!(thai.len() > 7);
        let result = Validator::new().required_text("name", thai, 7).finish();
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn dates_are_parsed_or_reported() {
        let mut validator = Validator::new();
        let date = validator.optional_date("due_at", Some("2024-05-01T10:00:00+07:00"));
        assert_eq!(date.map(|d| d.to_rfc3339()), Some("2024-05-01T03:00:00+00:00".to_owned()));
        assert_eq!(validator.optional_date("starts_at", Some("  ")), None);
        assert_eq!(validator.finish(), Ok(()));

        assert_eq!(validator.optional_date("ends_at", Some("tomorrow")), None);
        let Err(ServiceError::ValidationFailed(errors)) = validator.finish() else {
            panic!("expected validation failure");
        };
        assert_eq!(errors[0].error, "field_invalid_date");
    }
}
