// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Formwerk form filler.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FillWarning, FormwerkError, Result};

// -- Geometry -----------------------------------------------------------------

/// An axis-aligned rectangle in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Build a rectangle from two opposite corners in any order.
    pub fn from_corners(ax: f32, ay: f32, bx: f32, by: f32) -> Self {
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// True when the rectangle encloses no area (or holds non-finite numbers).
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }
}

// -- Fields -------------------------------------------------------------------

/// The kind of a form field, as far as filling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Free text (also used for choice fields, which take a string value).
    Text,
    /// A two-state button.
    Checkbox,
    /// A radio button. Each widget is treated as an independent checkbox.
    Radio,
}

impl FieldKind {
    pub fn is_button(self) -> bool {
        matches!(self, FieldKind::Checkbox | FieldKind::Radio)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
        };
        f.write_str(label)
    }
}

/// The current value of a resolved field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Toggle(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Toggle(_) => None,
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self, FieldValue::Toggle(true))
    }
}

// -- Caller input -------------------------------------------------------------

/// A single value supplied by the caller for a named field.
///
/// Deserializes untagged, so a JSON submission such as
/// `{"date": "07.08.2025", "floors": 3, "use_lift": true}` maps directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Words accepted as "checked" for button fields, compared after trimming and
/// lower-casing. The form surface is Russian, hence the Russian affirmatives.
pub const AFFIRMATIVE_WORDS: [&str; 8] = ["1", "true", "yes", "on", "y", "да", "д", "угу"];

impl InputValue {
    /// String form used for text fields. `Null` yields `None` (keep the
    /// template's own value). Floats keep their fractional part, so `3.0`
    /// stays `"3.0"`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            InputValue::Null => None,
            InputValue::Bool(flag) => Some(flag.to_string()),
            InputValue::Integer(number) => Some(number.to_string()),
            InputValue::Float(number) => Some(format!("{number:?}")),
            InputValue::Text(text) => Some(text.clone()),
        }
    }

    /// Boolean coercion for checkbox and radio fields.
    pub fn is_affirmative(&self) -> bool {
        match self {
            InputValue::Bool(flag) => *flag,
            other => match other.to_text() {
                Some(text) => {
                    let normalized = text.trim().to_lowercase();
                    AFFIRMATIVE_WORDS.contains(&normalized.as_str())
                }
                None => false,
            },
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_owned())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Text(value)
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        InputValue::Bool(value)
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        InputValue::Integer(value)
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        InputValue::Float(value)
    }
}

/// Field-name to value mapping supplied by the caller.
///
/// Names match the template's field names exactly (case-sensitive). Unknown
/// names are ignored by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues(BTreeMap<String, InputValue>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a submission delivered as a JSON object.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(FormwerkError::Config(
                "form submission must be a JSON object".into(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<InputValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InputValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FieldValues
where
    K: Into<String>,
    V: Into<InputValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

// -- Reporting ----------------------------------------------------------------

/// Summary of one fill run, intended for operational logs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillReport {
    /// Widgets successfully resolved into fields.
    pub fields_resolved: usize,
    /// Fields whose value was written by the binder.
    pub fields_bound: usize,
    /// Non-fatal problems, in the order they were found.
    pub warnings: Vec<FillWarning>,
    /// SHA-256 of the produced document, lowercase hex.
    pub output_sha256: String,
}
