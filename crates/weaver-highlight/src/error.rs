//! Error types for highlight operations.
//!
//! Most engine entry points are infallible by contract and report failures
//! in their outputs (`dropped_ids`, `failed_ids`). The types here describe
//! *why* something was rejected, for logging and for user-facing messages.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a stored highlight range was dropped before segmentation.
#[derive(Error, Diagnostic, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RangeRejection {
    #[error("range start is negative")]
    #[diagnostic(code(highlight::range::negative_start))]
    NegativeStart,

    #[error("range end does not follow start")]
    #[diagnostic(code(highlight::range::empty))]
    EmptyOrInverted,

    #[error("range end exceeds text length")]
    #[diagnostic(code(highlight::range::out_of_bounds))]
    OutOfBounds,

    #[error("color is not in the palette")]
    #[diagnostic(code(highlight::range::invalid_color))]
    InvalidColor,

    #[error("creation timestamp is not a valid instant")]
    #[diagnostic(code(highlight::range::invalid_timestamp))]
    InvalidTimestamp,
}

/// Why a highlight produced no visible marker during rendering.
#[derive(Error, Diagnostic, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFailure {
    /// Rejected by validation before segmentation.
    #[error("dropped: {0}")]
    #[diagnostic(code(highlight::render::dropped))]
    Dropped(RangeRejection),

    /// Valid, but none of its text could be located in the tree.
    #[error("text could not be located in the document tree")]
    #[diagnostic(code(highlight::render::not_located))]
    NotLocated,

    /// The whole fragment was skipped because canonical text did not match.
    #[error("canonical text mismatch")]
    #[diagnostic(code(highlight::render::mismatch))]
    Mismatch,
}

/// Classification of a rejected selection.
///
/// Variants are listed in the order the converter checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionErrorKind {
    MismatchState,
    Collapsed,
    OutsideContent,
    CodeBlock,
    EmptyAfterTrim,
    TooShort,
    TooLong,
}

impl SelectionErrorKind {
    /// Wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionErrorKind::MismatchState => "MISMATCH_STATE",
            SelectionErrorKind::Collapsed => "COLLAPSED",
            SelectionErrorKind::OutsideContent => "OUTSIDE_CONTENT",
            SelectionErrorKind::CodeBlock => "CODE_BLOCK",
            SelectionErrorKind::EmptyAfterTrim => "EMPTY_AFTER_TRIM",
            SelectionErrorKind::TooShort => "TOO_SHORT",
            SelectionErrorKind::TooLong => "TOO_LONG",
        }
    }

    /// Default user-facing message.
    pub fn default_message(&self) -> &'static str {
        match self {
            SelectionErrorKind::MismatchState => {
                "Highlighting is unavailable because this document changed since it was saved."
            }
            SelectionErrorKind::Collapsed => "Select some text to highlight.",
            SelectionErrorKind::OutsideContent => "The selection is outside the document content.",
            SelectionErrorKind::CodeBlock => "Code blocks can't be highlighted.",
            SelectionErrorKind::EmptyAfterTrim => "The selection only contains whitespace.",
            SelectionErrorKind::TooShort => "The selection is too short to highlight.",
            SelectionErrorKind::TooLong => "The selection is too long to highlight.",
        }
    }
}

impl std::fmt::Display for SelectionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selection that cannot become a highlight.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
#[diagnostic(code(highlight::selection))]
pub struct SelectionError {
    pub kind: SelectionErrorKind,
    pub message: String,
}

impl SelectionError {
    /// Build an error with the kind's default message.
    pub fn new(kind: SelectionErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
        }
    }
}

impl From<SelectionErrorKind> for SelectionError {
    fn from(kind: SelectionErrorKind) -> Self {
        SelectionError::new(kind)
    }
}

/// Configuration could not be loaded.
#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("invalid highlight config: {0}")]
    #[diagnostic(code(highlight::config::parse))]
    Parse(#[from] serde_json::Error),

    #[error("invalid highlight config value for `{field}`: {reason}")]
    #[diagnostic(code(highlight::config::value))]
    Value { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_kind_serializes_screaming() {
        let json = serde_json::to_string(&SelectionErrorKind::EmptyAfterTrim).unwrap();
        assert_eq!(json, "\"EMPTY_AFTER_TRIM\"");
        assert_eq!(SelectionErrorKind::EmptyAfterTrim.as_str(), "EMPTY_AFTER_TRIM");
    }

    #[test]
    fn test_selection_error_display() {
        let err = SelectionError::new(SelectionErrorKind::TooShort);
        assert_eq!(
            err.to_string(),
            "TOO_SHORT: The selection is too short to highlight."
        );
    }

    #[test]
    fn test_render_failure_display() {
        let failure = RenderFailure::Dropped(RangeRejection::OutOfBounds);
        assert_eq!(failure.to_string(), "dropped: range end exceeds text length");
    }
}
