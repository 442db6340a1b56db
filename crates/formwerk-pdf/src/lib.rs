// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// formwerk-pdf — AcroForm fill-and-flatten engine.
//
// Resolves the widgets of a fillable PDF template into named fields, binds
// caller values into them, makes sure checked buttons have a usable appearance,
// and bakes everything into page content so no interactive form remains.

pub mod appearance;
pub mod bind;
pub mod flatten;
pub mod fonts;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod text;

#[cfg(any(test, feature = "fixtures"))]
pub mod testutil;

// Re-export the primary entry points so callers can use `formwerk_pdf::FormFiller` etc.
pub use fonts::EmbeddedFont;
pub use model::FormDocument;
pub use pipeline::{FilledDocument, FormFiller, fill_pdf};
pub use resolve::{ResolvedField, ResolvedForm, resolve_fields};
