//! Health check types for `pageindex doctor`.
//!
//! Individual checks live next to the state they inspect (see
//! [`crate::storage::Storage::health_checks`]).

use colored::Colorize;
use serde::Serialize;

/// High-level category for a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Database,
    Index,
    Favicons,
}

/// Status for an individual health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

impl CheckStatus {
    /// Whether the check is healthy enough for continued operation.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Single health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub category: CheckCategory,
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl HealthCheck {
    #[must_use]
    pub fn pass(category: CheckCategory, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            status: CheckStatus::Pass,
            message: message.into(),
            suggestion: None,
        }
    }

    #[must_use]
    pub fn failing(
        category: CheckCategory,
        status: CheckStatus,
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            category,
            name: name.into(),
            status,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// Render checks for terminal output, one line per check.
#[must_use]
pub fn format_checks(checks: &[HealthCheck]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for check in checks {
        let marker = match check.status {
            CheckStatus::Pass => "✓".green(),
            CheckStatus::Warning => "!".yellow(),
            CheckStatus::Error => "✗".red(),
        };
        let _ = writeln!(out, "  {marker} {}: {}", check.name.bold(), check.message);
        if let Some(suggestion) = &check.suggestion {
            let _ = writeln!(out, "      {} {suggestion}", "Hint:".cyan());
        }
    }
    out
}

/// Whether every check passed.
#[must_use]
pub fn all_ok(checks: &[HealthCheck]) -> bool {
    checks.iter().all(|check| check.status.is_ok())
}
