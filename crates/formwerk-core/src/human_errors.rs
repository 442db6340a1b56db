// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Submitter-facing messages for fatal fill errors.
//
// The people submitting forms never see engine internals. Every fatal error
// collapses to one of two short Russian messages; the technical detail stays
// in the operational logs.

use crate::error::FormwerkError;

/// A message suitable for showing to the person who submitted the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanError {
    /// Short message shown to the submitter.
    pub message: String,
    /// Whether re-sending the same submission might succeed.
    pub retriable: bool,
}

/// Convert a `FormwerkError` into the generic message the submitter sees.
pub fn humanize_error(err: &FormwerkError) -> HumanError {
    match err {
        FormwerkError::Serialization(_) => HumanError {
            message: "⚠️ Не удалось прочитать данные формы.".into(),
            retriable: false,
        },
        FormwerkError::OutputWrite(_) | FormwerkError::Io(_) => HumanError {
            message: "❌ Не удалось отправить заявку.".into(),
            retriable: true,
        },
        FormwerkError::TemplateRead(_)
        | FormwerkError::PdfError(_)
        | FormwerkError::FlattenInvariant(_)
        | FormwerkError::Font(_)
        | FormwerkError::Config(_) => HumanError {
            message: "❌ Не удалось отправить заявку.".into(),
            retriable: false,
        },
    }
}
