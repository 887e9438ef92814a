//! Validation Traits
//!
//! Input checks shared by the entity modules' `validate_create` and
//! `validate_update` hooks.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ApiError, ApiResult};

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

static CURRENCY_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").ok());

static LOCALE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,3}(-[A-Z][A-Za-z]{1,3})?$").ok());

/// Trait for validating non-empty strings.
///
/// # Example
/// ```ignore
/// input.client_name.validate_non_empty("client_name")?;
/// ```
pub trait ValidateNonEmpty {
    /// Returns `ApiError::missing_field` if the value is empty or whitespace-only.
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        if self.trim().is_empty() {
            return Err(ApiError::missing_field(field_name));
        }
        Ok(())
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        self.as_str().validate_non_empty(field_name)
    }
}

/// Absent optional values pass; present ones must be non-empty.
impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Ok(()),
        }
    }
}

/// Trait for validating numeric ranges.
pub trait ValidateRange {
    /// Validate that the value is zero or more.
    fn validate_non_negative(&self, field_name: &str) -> ApiResult<()>;

    /// Validate that the value is within an inclusive range.
    fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()>
    where
        Self: Sized;
}

macro_rules! impl_validate_range {
    ($($t:ty),*) => {
        $(
            impl ValidateRange for $t {
                fn validate_non_negative(&self, field_name: &str) -> ApiResult<()> {
                    if !(*self >= 0 as $t) {
                        return Err(ApiError::validation_failed(format!(
                            "{} must not be negative",
                            field_name
                        )));
                    }
                    Ok(())
                }

                fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()> {
                    if !(*self >= min && *self <= max) {
                        return Err(ApiError::validation_failed(format!(
                            "{} must be between {} and {}",
                            field_name, min, max
                        )));
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_validate_range!(i32, i64, f64);

/// Validate an email address shape.
pub fn validate_email(value: &str, field_name: &str) -> ApiResult<()> {
    match EMAIL_RE.as_ref() {
        Some(re) if re.is_match(value.trim()) => Ok(()),
        _ => Err(ApiError::invalid_format(field_name, "email address")),
    }
}

/// Validate an ISO 4217 style currency code.
pub fn validate_currency(value: &str) -> ApiResult<()> {
    match CURRENCY_RE.as_ref() {
        Some(re) if re.is_match(value) => Ok(()),
        _ => Err(ApiError::invalid_format("currency", "three uppercase letters")),
    }
}

/// Validate a BCP 47 style locale tag such as `en` or `pt-BR`.
pub fn validate_locale_code(value: &str) -> ApiResult<()> {
    match LOCALE_RE.as_ref() {
        Some(re) if re.is_match(value) => Ok(()),
        _ => Err(ApiError::invalid_format("locale_code", "language tag like en-US")),
    }
}

/// Trait for checking if an update request has any fields set.
pub trait HasUpdates {
    /// Check if any update fields are set.
    fn has_any_updates(&self) -> bool;

    /// Validate that at least one update field is set.
    fn validate_has_updates(&self) -> ApiResult<()> {
        if !self.has_any_updates() {
            return Err(ApiError::invalid_input(
                "At least one field must be provided for update",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_empty_str() {
        assert!("hello".validate_non_empty("test").is_ok());
        assert!("".validate_non_empty("test").is_err());
        assert!("   ".validate_non_empty("test").is_err());
        assert!("  hi  ".validate_non_empty("test").is_ok());
    }

    #[test]
    fn test_validate_non_empty_option() {
        let some_str: Option<String> = Some("hello".into());
        let some_empty: Option<String> = Some(String::new());
        let none_str: Option<String> = None;

        assert!(some_str.validate_non_empty("test").is_ok());
        assert!(some_empty.validate_non_empty("test").is_err());
        assert!(none_str.validate_non_empty("test").is_ok());
    }

    #[test]
    fn test_validate_range() {
        assert!(5i32.validate_range("test", 1, 10).is_ok());
        assert!(10i32.validate_range("test", 1, 10).is_ok());
        assert!(0i32.validate_range("test", 1, 10).is_err());
        assert!(100.5f64.validate_range("score", 0.0, 100.0).is_err());
        assert!(f64::NAN.validate_non_negative("amount").is_err());
        assert!((-1i64).validate_non_negative("amount").is_err());
    }

    #[test]
    fn test_validate_email_and_currency() {
        assert!(validate_email("ops@kazi.app", "email").is_ok());
        assert!(validate_email("not-an-email", "email").is_err());
        assert!(validate_currency("USD").is_ok());
        assert!(validate_currency("usd").is_err());
    }

    #[test]
    fn test_validate_locale_code() {
        assert!(validate_locale_code("en").is_ok());
        assert!(validate_locale_code("pt-BR").is_ok());
        assert!(validate_locale_code("zh-Hant").is_ok());
        assert!(validate_locale_code("EN_us").is_err());
        assert!(validate_locale_code("").is_err());
    }
}
