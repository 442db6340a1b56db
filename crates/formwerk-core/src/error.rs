// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error and warning types for Formwerk.

use thiserror::Error;

/// Top-level error type for all Formwerk operations.
///
/// Every variant is fatal: the run is aborted and no output is left behind.
/// Recoverable problems are reported as [`FillWarning`] instead.
#[derive(Debug, Error)]
pub enum FormwerkError {
    // -- Input / output --
    #[error("template could not be read: {0}")]
    TemplateRead(String),

    #[error("output could not be written: {0}")]
    OutputWrite(String),

    // -- Engine --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("flattened document still carries form structures: {0}")]
    FlattenInvariant(String),

    #[error("font could not be loaded: {0}")]
    Font(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FormwerkError>;

/// A non-fatal problem encountered while filling a form.
///
/// Warnings never stop processing of the remaining fields or pages. They are
/// logged when they happen and collected into the run's report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FillWarning {
    /// A widget could not be resolved into a field and was skipped.
    #[error("widget on page {page} skipped ({}): {reason}", name.as_deref().unwrap_or("<unnamed>"))]
    FieldResolution {
        page: u32,
        name: Option<String>,
        reason: String,
    },

    /// A checked button got a blank on-state because no checkmark could be built.
    #[error("field {name:?} fell back to a blank on-state appearance: {reason}")]
    AppearanceSynthesis { name: String, reason: String },

    /// Some characters of a text value cannot be shown by the active font.
    #[error("field {name:?}: {replaced} character(s) not covered by the font were replaced")]
    UnencodableText { name: String, replaced: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_warning_names_unnamed_widgets() {
        let warning = FillWarning::FieldResolution {
            page: 2,
            name: None,
            reason: "missing /Rect".into(),
        };
        assert_eq!(
            warning.to_string(),
            "widget on page 2 skipped (<unnamed>): missing /Rect"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: FormwerkError = std::io::Error::other("disk full").into();
        assert!(matches!(err, FormwerkError::Io(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
