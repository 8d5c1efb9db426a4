// Field-level request validation.
//
// Every controller repeats the same handful of rules (required, max length,
// member-of-list, date ordering), so they live here and accumulate into the
// per-field error map the envelope expects.
use std::collections::HashMap;

use crate::error::{ApiError, FieldErrors};

#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self { errors: HashMap::new() }
    }

    fn push(&mut self, field: &str, message: String) {
        self.errors.entry(field.to_string()).or_default().push(message);
    }

    /// Required, non-blank string. Returns the trimmed value when present so
    /// later rules can chain off it.
    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Some(v),
            None => {
                self.push(field, format!("The {} field is required.", field));
                None
            }
        }
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.push(field, format!("The {} may not be greater than {} characters.", field, max));
            }
        }
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) {
        if let Some(v) = value {
            let well_formed = v.split_once('@').map_or(false, |(local, domain)| {
                !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
            });
            if !well_formed {
                self.push(field, format!("The {} must be a valid email address.", field));
            }
        }
    }

    pub fn one_of(&mut self, field: &str, value: Option<&str>, allowed: &[&str]) {
        if let Some(v) = value {
            if !allowed.contains(&v) {
                self.push(field, format!("The selected {} is invalid.", field));
            }
        }
    }

    pub fn min_i32(&mut self, field: &str, value: Option<i32>, min: i32) {
        if let Some(v) = value {
            if v < min {
                self.push(field, format!("The {} must be at least {}.", field, min));
            }
        }
    }

    pub fn min_len(&mut self, field: &str, value: Option<&str>, min: usize) {
        if let Some(v) = value {
            if v.chars().count() < min {
                self.push(field, format!("The {} must be at least {} characters.", field, min));
            }
        }
    }

    pub fn date_not_before(
        &mut self,
        field: &str,
        value: Option<chrono::NaiveDate>,
        floor_field: &str,
        floor: Option<chrono::NaiveDate>,
    ) {
        if let (Some(v), Some(f)) = (value, floor) {
            if v < f {
                self.push(
                    field,
                    format!("The {} must be a date after or equal to {}.", field, floor_field),
                );
            }
        }
    }

    pub fn confirm(&mut self, field: &str, value: Option<&str>, confirmation: Option<&str>) {
        if value.is_some() && value != confirmation {
            self.push(field, format!("The {} confirmation does not match.", field));
        }
    }

    /// Inject a uniqueness violation detected by the database layer.
    pub fn taken(&mut self, field: &str) {
        self.push(field, format!("The {} has already been taken.", field));
    }

    /// Reference to a row that does not exist, or a token that did not decode.
    pub fn invalid(&mut self, field: &str) {
        self.push(field, format!("The selected {} is invalid.", field));
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_reports() {
        let mut v = Validator::new();
        assert_eq!(v.required("name", Some("  Alice  ")), Some("Alice"));
        assert_eq!(v.required("email", Some("   ")), None);
        assert_eq!(v.required("phone", None), None);
        let err = v.finish().unwrap_err();
        let body = err.to_json();
        assert!(body["errors"]["email"][0].as_str().unwrap().contains("required"));
        assert!(body["errors"]["phone"][0].as_str().unwrap().contains("required"));
        assert!(body["errors"].get("name").is_none());
    }

    #[test]
    fn email_shape_is_checked() {
        let mut v = Validator::new();
        v.email("email", Some("alice@example.com"));
        assert!(v.is_ok());
        v.email("email", Some("not-an-email"));
        assert!(!v.is_ok());
    }

    #[test]
    fn one_of_accepts_listed_values_only() {
        let mut v = Validator::new();
        v.one_of("role", Some("admin"), crate::database::models::ROLES);
        assert!(v.is_ok());
        v.one_of("role", Some("superuser"), crate::database::models::ROLES);
        assert!(!v.is_ok());
    }

    #[test]
    fn date_ordering() {
        use chrono::NaiveDate;
        let start = NaiveDate::from_ymd_opt(2025, 1, 10);
        let end_ok = NaiveDate::from_ymd_opt(2025, 1, 10);
        let end_bad = NaiveDate::from_ymd_opt(2025, 1, 9);

        let mut v = Validator::new();
        v.date_not_before("estimated_end_date", end_ok, "start_date", start);
        assert!(v.is_ok());
        v.date_not_before("estimated_end_date", end_bad, "start_date", start);
        assert!(!v.is_ok());
    }

    #[test]
    fn multiple_errors_accumulate_per_field() {
        let mut v = Validator::new();
        v.required("name", None);
        v.max_len("name", Some(&"x".repeat(300)), 255);
        let err = v.finish().unwrap_err();
        assert_eq!(err.status_code(), 422);
        let body = err.to_json();
        assert_eq!(body["errors"]["name"].as_array().unwrap().len(), 2);
    }
}
