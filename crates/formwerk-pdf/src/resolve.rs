// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Field resolver — walks every page's annotations and turns named widgets into
// typed field records.

use std::fmt;

use formwerk_core::{FieldKind, FieldValue, FillWarning, Rect};
use lopdf::{Dictionary, Object, ObjectId};
use tracing::{debug, info, instrument, warn};

use crate::model::{FormDocument, MAX_DEPTH};
use crate::text::{decode_object_text, normalize_field_name};

/// On-state used when a button's appearance dictionary names none.
pub const DEFAULT_ON_STATE: &[u8] = b"Yes";
pub const OFF_STATE: &[u8] = b"Off";

const FLAG_RADIO: i64 = 1 << 15;
const FLAG_PUSHBUTTON: i64 = 1 << 16;
const ANNOT_HIDDEN: i64 = 1 << 1;
const ANNOT_NO_VIEW: i64 = 1 << 5;

/// An appearance state name (`/Yes`, `/Off`, `/On`, ...), kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateName(pub Vec<u8>);

impl StateName {
    pub fn off() -> Self {
        Self(OFF_STATE.to_vec())
    }

    pub fn is_off(&self) -> bool {
        self.0 == OFF_STATE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// One widget resolved into a fillable field.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// Fully qualified field name.
    pub name: String,
    pub kind: FieldKind,
    pub rect: Rect,
    pub value: FieldValue,
    /// The button's on-state, decided once here. `None` for text fields.
    pub on_state: Option<StateName>,
    /// Whether the widget carries a normal (`/AP /N`) appearance.
    pub has_appearance: bool,
    /// Hidden widgets are removed but never drawn.
    pub hidden: bool,
    /// Set by the binder when the caller supplied this field's value.
    pub bound: bool,
    pub page_number: u32,
    pub page_id: ObjectId,
    pub widget_id: ObjectId,
    /// The field dictionary that carries `/T` and `/V` (the widget itself for
    /// merged field/widget annotations).
    pub holder_id: ObjectId,
}

/// A widget that takes no value (pushbutton, signature, unknown type).
/// It is flattened from its appearance, if any, and removed.
#[derive(Debug, Clone)]
pub struct PassiveWidget {
    pub name: String,
    pub rect: Rect,
    pub hidden: bool,
    pub page_id: ObjectId,
    pub widget_id: ObjectId,
}

/// Everything the resolver found, in page order.
#[derive(Debug, Default)]
pub struct ResolvedForm {
    pub fields: Vec<ResolvedField>,
    pub passive: Vec<PassiveWidget>,
    pub warnings: Vec<FillWarning>,
}

impl ResolvedForm {
    fn skip(&mut self, page: u32, name: Option<String>, reason: impl Into<String>) {
        let warning = FillWarning::FieldResolution {
            page,
            name,
            reason: reason.into(),
        };
        warn!(%warning, "Widget skipped");
        self.warnings.push(warning);
    }
}

/// Resolve every named widget in the document.
#[instrument(skip_all)]
pub fn resolve_fields(form: &FormDocument) -> ResolvedForm {
    let mut resolved = ResolvedForm::default();

    for (page_number, page_id) in form.pages() {
        for entry in form.annotation_entries(page_id) {
            let widget_id = match entry {
                Object::Reference(id) => id,
                ref inline => {
                    if form.resolve_dict(inline).is_some_and(FormDocument::is_widget) {
                        resolved.skip(page_number, None, "inline widget annotation");
                    }
                    continue;
                }
            };
            let Some(widget) = form.dict(widget_id) else {
                continue;
            };
            if !FormDocument::is_widget(widget) {
                continue;
            }
            resolve_widget(form, &mut resolved, page_number, page_id, widget_id, widget);
        }
    }

    info!(
        fields = resolved.fields.len(),
        passive = resolved.passive.len(),
        warnings = resolved.warnings.len(),
        "Fields resolved"
    );
    resolved
}

fn resolve_widget(
    form: &FormDocument,
    resolved: &mut ResolvedForm,
    page_number: u32,
    page_id: ObjectId,
    widget_id: ObjectId,
    widget: &Dictionary,
) {
    let chain = field_chain(form, widget_id, widget);
    let annotation_flags = form
        .lookup(widget, b"F")
        .and_then(|f| f.as_i64().ok())
        .unwrap_or(0);
    let hidden = annotation_flags & (ANNOT_HIDDEN | ANNOT_NO_VIEW) != 0;

    let name = match qualified_name(&chain) {
        Ok(Some(name)) => name,
        Ok(None) => {
            // Nothing can be bound to it, but its look is still baked in.
            debug!(?widget_id, "Widget has no field name");
            if let Ok(rect) = read_rect(form, widget) {
                resolved.passive.push(PassiveWidget {
                    name: String::new(),
                    rect,
                    hidden,
                    page_id,
                    widget_id,
                });
            }
            return;
        }
        Err(reason) => {
            resolved.skip(page_number, None, reason);
            return;
        }
    };

    let rect = match read_rect(form, widget) {
        Ok(rect) => rect,
        Err(reason) => {
            resolved.skip(page_number, Some(name), reason);
            return;
        }
    };

    let flags = inherited(form, &chain, b"Ff")
        .and_then(|f| f.as_i64().ok())
        .unwrap_or(0);
    let holder_id = chain
        .iter()
        .find(|(_, dict)| dict.has(b"T"))
        .map(|(id, _)| *id)
        .unwrap_or(widget_id);

    let field_type = inherited(form, &chain, b"FT").and_then(|ft| match ft {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    });
    let kind = match field_type {
        Some(b"Tx") | Some(b"Ch") => Some(FieldKind::Text),
        Some(b"Btn") if flags & FLAG_PUSHBUTTON != 0 => None,
        Some(b"Btn") if flags & FLAG_RADIO != 0 => Some(FieldKind::Radio),
        Some(b"Btn") => Some(FieldKind::Checkbox),
        _ => None,
    };

    let Some(kind) = kind else {
        debug!(%name, "Passive widget");
        resolved.passive.push(PassiveWidget {
            name,
            rect,
            hidden,
            page_id,
            widget_id,
        });
        return;
    };

    let value_object = inherited(form, &chain, b"V");
    let (value, on_state) = if kind.is_button() {
        let checked = button_state(form, widget, value_object);
        let on_state = discover_on_state(form, widget)
            .unwrap_or_else(|| StateName(DEFAULT_ON_STATE.to_vec()));
        (FieldValue::Toggle(checked), Some(on_state))
    } else {
        (FieldValue::Text(text_value(value_object)), None)
    };

    debug!(%name, %kind, ?rect, "Field resolved");
    resolved.fields.push(ResolvedField {
        name,
        kind,
        rect,
        value,
        on_state,
        has_appearance: normal_appearance(form, widget).is_some(),
        hidden,
        bound: false,
        page_number,
        page_id,
        widget_id,
        holder_id,
    });
}

/// The widget followed by its ancestors through `/Parent`.
fn field_chain<'a>(
    form: &'a FormDocument,
    widget_id: ObjectId,
    widget: &'a Dictionary,
) -> Vec<(ObjectId, &'a Dictionary)> {
    let mut chain = vec![(widget_id, widget)];
    let mut current = widget;
    while chain.len() < MAX_DEPTH {
        let Ok(Object::Reference(parent_id)) = current.get(b"Parent") else {
            break;
        };
        if chain.iter().any(|(id, _)| id == parent_id) {
            break;
        }
        let Some(parent) = form.dict(*parent_id) else {
            break;
        };
        chain.push((*parent_id, parent));
        current = parent;
    }
    chain
}

/// Join the partial names of the chain, outermost first.
fn qualified_name(chain: &[(ObjectId, &Dictionary)]) -> Result<Option<String>, String> {
    let mut parts = Vec::new();
    for (_, dict) in chain.iter().rev() {
        let Ok(raw) = dict.get(b"T") else { continue };
        let text = decode_object_text(raw).ok_or_else(|| "unreadable /T".to_string())?;
        let part = normalize_field_name(&text);
        if !part.is_empty() {
            parts.push(part);
        }
    }
    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(".")))
    }
}

/// First value of `key` found walking up the chain.
fn inherited<'a>(
    form: &'a FormDocument,
    chain: &[(ObjectId, &'a Dictionary)],
    key: &[u8],
) -> Option<&'a Object> {
    chain.iter().find_map(|(_, dict)| form.lookup(dict, key))
}

fn read_rect(form: &FormDocument, widget: &Dictionary) -> Result<Rect, String> {
    let Some(Object::Array(items)) = form.lookup(widget, b"Rect") else {
        return Err("missing /Rect".into());
    };
    let numbers: Vec<f32> = items
        .iter()
        .filter_map(|item| form.resolve(item))
        .filter_map(|item| item.as_float().ok())
        .collect();
    if numbers.len() != 4 {
        return Err(format!("malformed /Rect with {} number(s)", numbers.len()));
    }
    let rect = Rect::from_corners(numbers[0], numbers[1], numbers[2], numbers[3]);
    if rect.is_degenerate() {
        return Err("degenerate /Rect".into());
    }
    Ok(rect)
}

fn button_state(form: &FormDocument, widget: &Dictionary, value: Option<&Object>) -> bool {
    let state = form.lookup(widget, b"AS").or(value);
    matches!(state, Some(Object::Name(name)) if name != OFF_STATE)
}

fn text_value(value: Option<&Object>) -> String {
    match value {
        Some(Object::Array(items)) => items.iter().find_map(decode_object_text),
        Some(other) => decode_object_text(other),
        None => None,
    }
    .unwrap_or_default()
}

/// The widget's `/AP /N` entry, resolved.
pub(crate) fn normal_appearance<'a>(
    form: &'a FormDocument,
    widget: &'a Dictionary,
) -> Option<&'a Object> {
    let appearance = form.resolve_dict(widget.get(b"AP").ok()?)?;
    form.lookup(appearance, b"N")
}

/// First state name in `/AP /N` other than `Off`.
pub(crate) fn discover_on_state(form: &FormDocument, widget: &Dictionary) -> Option<StateName> {
    match normal_appearance(form, widget)? {
        Object::Dictionary(states) => states
            .iter()
            .map(|(key, _)| key)
            .find(|key| key.as_slice() != OFF_STATE)
            .map(|key| StateName(key.clone())),
        _ => None,
    }
}
