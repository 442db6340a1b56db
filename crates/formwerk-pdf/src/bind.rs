// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value binder — writes caller values into the resolved fields.

use std::collections::HashSet;

use formwerk_core::error::Result;
use formwerk_core::{FieldValue, FieldValues, InputValue};
use lopdf::{Object, ObjectId};
use tracing::{debug, info, instrument};

use crate::model::FormDocument;
use crate::resolve::{ResolvedField, StateName};

/// Apply `values` to `fields`, mutating the document's field dictionaries.
///
/// Text fields take the string form of their value; a missing or null value
/// keeps the template's text. Buttons are always set: checked when the value
/// is affirmative, unchecked otherwise (including when absent). Returns the
/// number of fields written.
#[instrument(skip_all, fields(fields = fields.len(), values = values.len()))]
pub fn bind_values(
    form: &mut FormDocument,
    fields: &mut [ResolvedField],
    values: &FieldValues,
) -> Result<usize> {
    // Holders already switched on by a sibling widget; a later unchecked
    // sibling must not reset them.
    let mut holders_on: HashSet<ObjectId> = HashSet::new();
    let mut bound = 0;

    for field in fields.iter_mut() {
        let supplied = values.get(&field.name);

        if field.kind.is_button() {
            let checked = supplied.is_some_and(InputValue::is_affirmative);
            let state = match (&field.on_state, checked) {
                (Some(on), true) => on.clone(),
                _ => StateName::off(),
            };
            let state_object = Object::Name(state.as_bytes().to_vec());

            form.dict_mut(field.widget_id)?
                .set("AS", state_object.clone());
            let shared_holder = field.holder_id != field.widget_id;
            if checked || !shared_holder || !holders_on.contains(&field.holder_id) {
                form.dict_mut(field.holder_id)?.set("V", state_object);
            }
            if checked {
                holders_on.insert(field.holder_id);
            }

            debug!(name = %field.name, %state, "Button bound");
            field.value = FieldValue::Toggle(checked);
            field.bound = true;
            bound += 1;
        } else if let Some(text) = supplied.and_then(InputValue::to_text) {
            form.dict_mut(field.holder_id)?
                .set("V", lopdf::text_string(&text));
            debug!(name = %field.name, chars = text.chars().count(), "Text bound");
            field.value = FieldValue::Text(text);
            field.bound = true;
            bound += 1;
        }
    }

    info!(bound, "Values bound");
    Ok(bound)
}
