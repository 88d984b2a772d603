//! Declarative field rules.

use crate::errors::BrokenRule;
use regex::Regex;
use std::fmt::Display;
use std::sync::OnceLock;

/// A message type that can check its own fields.
pub trait Validate {
    /// Returns one entry per violated constraint.
    fn validate(&self) -> Vec<BrokenRule>;
}

#[allow(clippy::expect_used)]
fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

/// Collects broken rules for one value.
///
/// ```rust,ignore
/// Rules::new()
///     .required("name", &self.name)
///     .range("age", self.age, 0, 150)
///     .finish()
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct Rules {
    broken: Vec<BrokenRule>,
}

impl Rules {
    /// Starts an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom rule that is broken when `valid` is false.
    pub fn check(mut self, valid: bool, field: &str, code: &str, message: impl Into<String>) -> Self {
        if !valid {
            self.broken.push(BrokenRule::new(field, code, message));
        }
        self
    }

    /// The string must contain non-whitespace characters.
    pub fn required(self, field: &str, value: &str) -> Self {
        let valid = !value.trim().is_empty();
        self.check(valid, field, "required", format!("{field} is required"))
    }

    /// The option must hold a value.
    pub fn present<T>(self, field: &str, value: Option<&T>) -> Self {
        self.check(value.is_some(), field, "required", format!("{field} is required"))
    }

    /// The value must lie within `min..=max`.
    pub fn range<T: PartialOrd + Display>(self, field: &str, value: T, min: T, max: T) -> Self {
        let valid = value >= min && value <= max;
        let message = format!("{field} must be between {min} and {max}");
        self.check(valid, field, "range", message)
    }

    /// The string must be at most `max` characters long.
    pub fn max_length(self, field: &str, value: &str, max: usize) -> Self {
        let valid = value.chars().count() <= max;
        self.check(valid, field, "max_length", format!("{field} must be at most {max} characters"))
    }

    /// The string must be at least `min` characters long.
    pub fn min_length(self, field: &str, value: &str, min: usize) -> Self {
        let valid = value.chars().count() >= min;
        self.check(valid, field, "min_length", format!("{field} must be at least {min} characters"))
    }

    /// The string must match the pattern.
    pub fn matches(self, field: &str, value: &str, pattern: &Regex) -> Self {
        let valid = pattern.is_match(value);
        self.check(valid, field, "pattern", format!("{field} has an invalid format"))
    }

    /// The string must look like an email address.
    pub fn email(self, field: &str, value: &str) -> Self {
        let valid = email_pattern().is_match(value);
        self.check(valid, field, "email", format!("{field} must be a valid email address"))
    }

    /// Returns the broken rules.
    #[must_use]
    pub fn finish(self) -> Vec<BrokenRule> {
        self.broken
    }
}
