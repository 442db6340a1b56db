// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Appearance synthesizer — gives checked buttons a usable on-state appearance.
//
// Fallback chain per checked button: discover the on-state (resolver), validate
// that `/AP /N` holds a stream for it and for `Off`, and synthesize whatever is
// missing. Synthesis never fails the run; a checkmark that cannot be built
// becomes a blank on-state plus a warning.

use formwerk_core::{FillWarning, Rect};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, instrument, warn};

use crate::model::FormDocument;
use crate::resolve::{ResolvedField, StateName, normal_appearance};

/// ZapfDingbats code for the check glyph (a20) and its metrics in 1/1000 em.
const CHECK_GLYPH: &[u8] = b"4";
const CHECK_GLYPH_WIDTH: f32 = 0.846;
const CHECK_GLYPH_HEIGHT: f32 = 0.705;
/// Share of the shorter rectangle side the glyph occupies.
const CHECK_SCALE: f32 = 0.8;

/// Ensure every checked button has both an on-state and an `Off` appearance
/// stream, and that `/AP /N` names exactly one on-state.
#[instrument(skip_all, fields(fields = fields.len()))]
pub fn synthesize_appearances(
    form: &mut FormDocument,
    fields: &[ResolvedField],
) -> Vec<FillWarning> {
    let mut warnings = Vec::new();
    let mut synthesized = 0;

    for field in fields.iter().filter(|f| f.kind.is_button() && f.value.is_checked()) {
        let Some(on_state) = field.on_state.clone() else {
            continue;
        };

        let existing_on = validated_state_stream(form, field.widget_id, &on_state);
        let existing_off = validated_state_stream(form, field.widget_id, &StateName::off());

        let on_id = match existing_on {
            Some(id) => id,
            None => {
                synthesized += 1;
                let stream = checkmark_stream(field.rect).unwrap_or_else(|reason| {
                    let warning = FillWarning::AppearanceSynthesis {
                        name: field.name.clone(),
                        reason,
                    };
                    warn!(%warning, "Checkmark synthesis failed");
                    warnings.push(warning);
                    blank_stream(field.rect)
                });
                form.add_object(stream)
            }
        };
        let off_id = match existing_off {
            Some(id) => id,
            None => form.add_object(blank_stream(field.rect)),
        };

        if let Err(reason) = install_states(form, field.widget_id, &on_state, on_id, off_id) {
            let warning = FillWarning::AppearanceSynthesis {
                name: field.name.clone(),
                reason,
            };
            warn!(%warning, "Appearance could not be installed");
            warnings.push(warning);
            continue;
        }
        debug!(name = %field.name, state = %on_state, "Appearance states ready");
    }

    info!(synthesized, warnings = warnings.len(), "Appearances checked");
    warnings
}

/// The object id of the `/AP /N` stream for `state`, if it exists and really
/// is a stream.
fn validated_state_stream(
    form: &FormDocument,
    widget_id: ObjectId,
    state: &StateName,
) -> Option<ObjectId> {
    let widget = form.dict(widget_id)?;
    let Object::Dictionary(states) = normal_appearance(form, widget)? else {
        return None;
    };
    match states.get(state.as_bytes()).ok()? {
        Object::Reference(id) => match form.document().get_object(*id) {
            Ok(Object::Stream(_)) => Some(*id),
            _ => None,
        },
        _ => None,
    }
}

/// Rewrite the widget's `/AP` so `/N` holds exactly `on_state` and `Off`.
fn install_states(
    form: &mut FormDocument,
    widget_id: ObjectId,
    on_state: &StateName,
    on_id: ObjectId,
    off_id: ObjectId,
) -> Result<(), String> {
    let mut appearance = form
        .dict(widget_id)
        .and_then(|widget| widget.get(b"AP").ok())
        .and_then(|ap| form.resolve_dict(ap))
        .cloned()
        .unwrap_or_default();

    let mut normal = Dictionary::new();
    normal.set(on_state.as_bytes().to_vec(), Object::Reference(on_id));
    normal.set("Off", Object::Reference(off_id));
    appearance.set("N", Object::Dictionary(normal));

    form.dict_mut(widget_id)
        .map_err(|err| err.to_string())?
        .set("AP", Object::Dictionary(appearance));
    Ok(())
}

fn form_xobject_dict(rect: Rect) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(rect.width()),
            Object::Real(rect.height()),
        ],
    }
}

fn blank_stream(rect: Rect) -> Stream {
    Stream::new(form_xobject_dict(rect), Vec::new())
}

/// A Form XObject painting a ZapfDingbats check centred in the field.
pub(crate) fn checkmark_stream(rect: Rect) -> Result<Stream, String> {
    let (width, height) = (rect.width(), rect.height());
    if !(width >= 1.0 && height >= 1.0) {
        return Err(format!("field too small for a checkmark ({width}x{height})"));
    }

    let size = width.min(height) * CHECK_SCALE;
    let x = (width - size * CHECK_GLYPH_WIDTH) / 2.0;
    let y = (height - size * CHECK_GLYPH_HEIGHT) / 2.0;

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("g", vec![Object::Integer(0)]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"ZaDb".to_vec()), Object::Real(size)]),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new(
                "Tj",
                vec![Object::String(CHECK_GLYPH.to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    let bytes = content.encode().map_err(|err| err.to_string())?;

    let mut dict = form_xobject_dict(rect);
    dict.set(
        "Resources",
        dictionary! {
            "Font" => dictionary! {
                "ZaDb" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "ZapfDingbats",
                },
            },
        },
    );
    Ok(Stream::new(dict, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::bind_values;
    use crate::resolve::resolve_fields;
    use crate::testutil::{TemplateBuilder, WidgetSpec};
    use formwerk_core::FieldValues;

    fn states_of(form: &FormDocument, widget_id: ObjectId) -> Vec<Vec<u8>> {
        let widget = form.dict(widget_id).unwrap();
        match normal_appearance(form, widget) {
            Some(Object::Dictionary(states)) => states.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn missing_on_state_gets_a_checkmark() {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(WidgetSpec::checkbox("use_lift", [300.0, 700.0, 312.0, 712.0]));
        let mut form = builder.into_form();
        let mut fields = resolve_fields(&form).fields;
        let values: FieldValues = [("use_lift", "yes")].into_iter().collect();
        bind_values(&mut form, &mut fields, &values).unwrap();

        let warnings = synthesize_appearances(&mut form, &fields);
        assert!(warnings.is_empty());

        let states = states_of(&form, fields[0].widget_id);
        assert_eq!(states, vec![b"Yes".to_vec(), b"Off".to_vec()]);
        let on_id = validated_state_stream(&form, fields[0].widget_id, &StateName(b"Yes".to_vec()))
            .unwrap();
        let Ok(Object::Stream(stream)) = form.document().get_object(on_id) else {
            panic!("on-state is not a stream");
        };
        let text = String::from_utf8_lossy(&stream.content);
        assert!(text.contains("/ZaDb"));
        assert!(text.contains("(4) Tj"));
    }

    #[test]
    fn valid_existing_states_are_kept() {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(
            WidgetSpec::checkbox("agree", [10.0, 10.0, 22.0, 22.0]).with_states(&["On", "Off"]),
        );
        let mut form = builder.into_form();
        let mut fields = resolve_fields(&form).fields;
        let on_before =
            validated_state_stream(&form, fields[0].widget_id, &StateName(b"On".to_vec()));
        let values: FieldValues = [("agree", true)].into_iter().collect();
        bind_values(&mut form, &mut fields, &values).unwrap();

        synthesize_appearances(&mut form, &fields);
        let on_after =
            validated_state_stream(&form, fields[0].widget_id, &StateName(b"On".to_vec()));
        assert!(on_before.is_some());
        assert_eq!(on_before, on_after);
    }

    #[test]
    fn extra_on_states_are_dropped() {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(
            WidgetSpec::checkbox("choice", [10.0, 10.0, 22.0, 22.0])
                .with_states(&["A", "B", "Off"]),
        );
        let mut form = builder.into_form();
        let mut fields = resolve_fields(&form).fields;
        let values: FieldValues = [("choice", "on")].into_iter().collect();
        bind_values(&mut form, &mut fields, &values).unwrap();

        synthesize_appearances(&mut form, &fields);
        assert_eq!(
            states_of(&form, fields[0].widget_id),
            vec![b"A".to_vec(), b"Off".to_vec()]
        );
    }

    #[test]
    fn tiny_field_falls_back_to_blank_with_warning() {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(WidgetSpec::checkbox("dot", [10.0, 10.0, 10.5, 10.5]));
        let mut form = builder.into_form();
        let mut fields = resolve_fields(&form).fields;
        let values: FieldValues = [("dot", "1")].into_iter().collect();
        bind_values(&mut form, &mut fields, &values).unwrap();

        let warnings = synthesize_appearances(&mut form, &fields);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], FillWarning::AppearanceSynthesis { name, .. } if name == "dot"));
        // The field is still logically checked and has both states.
        assert!(fields[0].value.is_checked());
        assert_eq!(states_of(&form, fields[0].widget_id).len(), 2);
    }

    #[test]
    fn unchecked_buttons_are_untouched() {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(WidgetSpec::checkbox("agree", [10.0, 10.0, 22.0, 22.0]));
        let mut form = builder.into_form();
        let fields = resolve_fields(&form).fields;

        synthesize_appearances(&mut form, &fields);
        assert!(states_of(&form, fields[0].widget_id).is_empty());
    }
}
