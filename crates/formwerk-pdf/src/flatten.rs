// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flattening renderer — bakes every widget into its page's content stream,
// then strips all widget annotations and the interactive-form dictionary.

use std::collections::HashMap;

use formwerk_core::error::{FormwerkError, Result};
use formwerk_core::{FieldKind, FillConfig, FillWarning, FlattenStrategy, Rect};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId};
use tracing::{debug, info, instrument, warn};

use crate::fonts::{EmbeddedFont, GlyphUsage, TextFont, helvetica_dictionary, write_embedded_font};
use crate::model::FormDocument;
use crate::resolve::{PassiveWidget, ResolvedField, ResolvedForm, normal_appearance};

/// Greedy shrink-to-fit: step down 1pt from `base` while `text` is wider than
/// `inner_width`, never going below `floor`. Text still too wide at the floor
/// is left to be clipped.
pub fn fit_font_size(font: &TextFont<'_>, text: &str, inner_width: f32, base: f32, floor: f32) -> f32 {
    let mut size = base;
    while font.text_width(text, size) > inner_width && size > floor {
        size = (size - 1.0).max(floor);
    }
    size
}

/// What gets painted for one widget.
#[derive(Debug, Clone, PartialEq)]
enum Paint {
    Nothing,
    Replay(ObjectId),
    Text(String),
    Check,
}

enum Target<'a> {
    Field(&'a ResolvedField),
    Passive(&'a PassiveWidget),
}

/// Per-run drawing state shared across pages.
struct Painter<'a> {
    config: &'a FillConfig,
    font: TextFont<'a>,
    embedded: Option<&'a EmbeddedFont>,
    usage: GlyphUsage,
    font_id: Option<ObjectId>,
    default_resources: Option<Dictionary>,
    warnings: Vec<FillWarning>,
}

/// Flatten `form` using the strategy from `config`.
///
/// Widgets that could not be resolved are still removed; only resolved ones
/// are painted.
#[instrument(skip_all, fields(strategy = ?config.strategy))]
pub fn flatten_document(
    form: &mut FormDocument,
    resolved: &ResolvedForm,
    config: &FillConfig,
    embedded: Option<&EmbeddedFont>,
) -> Result<Vec<FillWarning>> {
    let mut targets: HashMap<ObjectId, Target<'_>> = HashMap::new();
    for field in &resolved.fields {
        targets.insert(field.widget_id, Target::Field(field));
    }
    for widget in &resolved.passive {
        targets.insert(widget.widget_id, Target::Passive(widget));
    }

    let mut painter = Painter {
        config,
        font: embedded.map_or(TextFont::Helvetica, TextFont::Embedded),
        embedded,
        usage: GlyphUsage::default(),
        font_id: None,
        default_resources: form.default_resources(),
        warnings: Vec::new(),
    };

    let mut painted = 0;
    for (page_number, page_id) in form.pages() {
        let mut operations = Vec::new();
        let mut font_name: Option<String> = None;

        for entry in form.annotation_entries(page_id) {
            let Object::Reference(widget_id) = entry else {
                continue;
            };
            let Some(target) = targets.get(&widget_id) else {
                continue;
            };
            let paint = choose_paint(form, target, config.strategy);
            let drawn = painter.paint(form, page_id, target, paint, &mut font_name, &mut operations)?;
            if drawn {
                painted += 1;
            }
        }

        let removed = form.remove_widget_annotations(page_id)?;
        if !operations.is_empty() {
            let overlay = Content { operations }
                .encode()
                .map_err(|err| FormwerkError::PdfError(format!("failed to encode overlay: {}", err)))?;
            form.wrap_and_append_content(page_id, overlay)?;
        }
        if removed > 0 {
            debug!(page_number, removed, "Page flattened");
        }
    }

    if let (Some(font), Some(id)) = (painter.embedded, painter.font_id) {
        if !painter.usage.is_empty() {
            write_embedded_font(form, font, &painter.usage, id);
        }
    }

    let had_form = form.remove_acroform()?;
    form.prune();

    info!(painted, had_form, warnings = painter.warnings.len(), "Document flattened");
    Ok(painter.warnings)
}

fn choose_paint(form: &FormDocument, target: &Target<'_>, strategy: FlattenStrategy) -> Paint {
    match target {
        Target::Passive(widget) => {
            if widget.hidden || strategy == FlattenStrategy::DirectDraw {
                return Paint::Nothing;
            }
            appearance_stream(form, widget.widget_id).map_or(Paint::Nothing, Paint::Replay)
        }
        Target::Field(field) => {
            if field.hidden {
                return Paint::Nothing;
            }
            let drawn = match field.kind {
                FieldKind::Text => match field.value.as_text() {
                    Some(text) if !text.trim().is_empty() => Paint::Text(text.to_string()),
                    _ => Paint::Nothing,
                },
                FieldKind::Checkbox | FieldKind::Radio => {
                    if field.value.is_checked() {
                        Paint::Check
                    } else {
                        Paint::Nothing
                    }
                }
            };
            if strategy == FlattenStrategy::DirectDraw {
                return drawn;
            }
            // A bound text field's cached appearance shows the old value.
            let stale = field.kind == FieldKind::Text && field.bound;
            if stale {
                return drawn;
            }
            appearance_stream(form, field.widget_id).map_or(drawn, Paint::Replay)
        }
    }
}

/// The appearance stream a viewer would show for the widget right now: `/N`
/// itself, or the `/N` entry selected by `/AS`.
fn appearance_stream(form: &FormDocument, widget_id: ObjectId) -> Option<ObjectId> {
    let widget = form.dict(widget_id)?;
    let appearance = form.resolve_dict(widget.get(b"AP").ok()?)?;
    let entry = match appearance.get(b"N").ok()? {
        Object::Reference(id) => match form.document().get_object(*id).ok()? {
            Object::Stream(_) => return Some(*id),
            Object::Dictionary(states) => states,
            _ => return None,
        },
        Object::Dictionary(states) => states,
        _ => return None,
    };
    let Some(Object::Name(state)) = form.lookup(widget, b"AS") else {
        return None;
    };
    match entry.get(state).ok()? {
        Object::Reference(id) => match form.document().get_object(*id).ok()? {
            Object::Stream(_) => Some(*id),
            _ => None,
        },
        _ => None,
    }
}

impl Painter<'_> {
    /// Append the operations for one widget. Returns whether anything was drawn.
    fn paint(
        &mut self,
        form: &mut FormDocument,
        page_id: ObjectId,
        target: &Target<'_>,
        paint: Paint,
        font_name: &mut Option<String>,
        operations: &mut Vec<Operation>,
    ) -> Result<bool> {
        let (name, rect) = match target {
            Target::Field(field) => (field.name.as_str(), field.rect),
            Target::Passive(widget) => (widget.name.as_str(), widget.rect),
        };

        match paint {
            Paint::Nothing => return Ok(false),
            Paint::Replay(stream_id) => {
                let xobject = self.prepare_xobject(form, stream_id)?;
                let resource = form.add_page_resource(
                    page_id,
                    b"XObject",
                    "FwAp",
                    Object::Reference(stream_id),
                )?;
                operations.extend(replay_operations(&xobject, rect, &resource));
            }
            Paint::Check => operations.extend(check_operations(rect)),
            Paint::Text(text) => {
                let resource = match font_name {
                    Some(existing) => existing.clone(),
                    None => {
                        let font_id = self.font_object(form);
                        let created =
                            form.add_page_resource(page_id, b"Font", "FwF", Object::Reference(font_id))?;
                        *font_name = Some(created.clone());
                        created
                    }
                };
                operations.extend(self.text_operations(name, &text, rect, &resource));
            }
        }
        debug!(%name, "Widget painted");
        Ok(true)
    }

    /// The shared font object, created on first use.
    fn font_object(&mut self, form: &mut FormDocument) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = match self.embedded {
            Some(_) => form.reserve_object_id(),
            None => form.add_object(helvetica_dictionary()),
        };
        self.font_id = Some(id);
        id
    }

    /// Make sure the stream is a usable Form XObject and return its dictionary.
    fn prepare_xobject(&self, form: &mut FormDocument, stream_id: ObjectId) -> Result<Dictionary> {
        let default_resources = self.default_resources.clone();
        let dict = form.dict_mut(stream_id)?;
        dict.set("Type", "XObject");
        dict.set("Subtype", "Form");
        if !dict.has(b"Resources") {
            if let Some(resources) = default_resources {
                dict.set("Resources", Object::Dictionary(resources));
            }
        }
        Ok(dict.clone())
    }

    fn text_operations(&mut self, name: &str, text: &str, rect: Rect, font_name: &str) -> Vec<Operation> {
        let text = text.replace(['\r', '\n'], " ");
        let padding = self.config.text_padding;
        let inner_width = rect.width() - 2.0 * padding;
        let size = fit_font_size(
            &self.font,
            &text,
            inner_width,
            self.config.base_font_size,
            self.config.min_font_size,
        );
        let baseline = rect.y0 + (rect.height() - size) / 2.0 + self.font.descent() * size;

        let encoded = self.font.encode(&text, &mut self.usage);
        if encoded.replaced > 0 {
            let warning = FillWarning::UnencodableText {
                name: name.to_string(),
                replaced: encoded.replaced,
            };
            warn!(%warning, "Text not fully covered by font");
            self.warnings.push(warning);
        }
        debug!(%name, size, "Text fitted");

        vec![
            Operation::new("q", vec![]),
            Operation::new(
                "re",
                vec![
                    Object::Real(rect.x0),
                    Object::Real(rect.y0),
                    Object::Real(rect.width()),
                    Object::Real(rect.height()),
                ],
            ),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("g", vec![Object::Integer(0)]),
            Operation::new(
                "Tf",
                vec![Object::Name(font_name.as_bytes().to_vec()), Object::Real(size)],
            ),
            Operation::new(
                "Td",
                vec![Object::Real(rect.x0 + padding), Object::Real(baseline)],
            ),
            Operation::new("Tj", vec![Object::String(encoded.bytes, encoded.format)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]
    }
}

/// Two strokes forming a check, centred in the largest square inside `rect`.
fn check_operations(rect: Rect) -> Vec<Operation> {
    let side = rect.width().min(rect.height());
    let ox = rect.x0 + (rect.width() - side) / 2.0;
    let oy = rect.y0 + (rect.height() - side) / 2.0;
    let margin = side * 0.2;

    vec![
        Operation::new("q", vec![]),
        Operation::new("G", vec![Object::Integer(0)]),
        Operation::new("w", vec![Object::Real(side * 0.1)]),
        Operation::new("J", vec![Object::Integer(1)]),
        Operation::new("j", vec![Object::Integer(1)]),
        Operation::new("m", vec![Object::Real(ox + margin), Object::Real(oy + side * 0.5)]),
        Operation::new("l", vec![Object::Real(ox + side * 0.4), Object::Real(oy + margin)]),
        Operation::new(
            "l",
            vec![Object::Real(ox + side - margin), Object::Real(oy + side - margin)],
        ),
        Operation::new("S", vec![]),
        Operation::new("Q", vec![]),
    ]
}

fn numbers(dict: &Dictionary, key: &[u8]) -> Option<Vec<f32>> {
    match dict.get(key).ok()? {
        Object::Array(items) => items.iter().map(|item| item.as_float().ok()).collect(),
        _ => None,
    }
}

/// Place the XObject so its (matrix-transformed) bounding box fills `rect`.
fn replay_operations(xobject: &Dictionary, rect: Rect, resource: &str) -> Vec<Operation> {
    let bbox = numbers(xobject, b"BBox")
        .filter(|b| b.len() == 4)
        .map(|b| Rect::from_corners(b[0], b[1], b[2], b[3]))
        .unwrap_or(Rect::from_corners(0.0, 0.0, rect.width(), rect.height()));
    let matrix = numbers(xobject, b"Matrix")
        .filter(|m| m.len() == 6)
        .unwrap_or_else(|| vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    let corners = [
        (bbox.x0, bbox.y0),
        (bbox.x1, bbox.y0),
        (bbox.x0, bbox.y1),
        (bbox.x1, bbox.y1),
    ];
    let transformed: Vec<(f32, f32)> = corners
        .iter()
        .map(|(x, y)| {
            (
                matrix[0] * x + matrix[2] * y + matrix[4],
                matrix[1] * x + matrix[3] * y + matrix[5],
            )
        })
        .collect();
    let min_x = transformed.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let max_x = transformed.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = transformed.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_y = transformed.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    let scale = |target: f32, source: f32| if source.abs() > f32::EPSILON { target / source } else { 1.0 };
    let sx = scale(rect.width(), max_x - min_x);
    let sy = scale(rect.height(), max_y - min_y);
    let tx = rect.x0 - min_x * sx;
    let ty = rect.y0 - min_y * sy;

    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(sx),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(sy),
                Object::Real(tx),
                Object::Real(ty),
            ],
        ),
        Operation::new("Do", vec![Object::Name(resource.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}
