// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Formwerk — Core types, configuration, and error definitions shared across crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod integrity;
pub mod types;

pub use config::{FillConfig, FlattenStrategy};
pub use error::{FillWarning, FormwerkError};
pub use types::*;
