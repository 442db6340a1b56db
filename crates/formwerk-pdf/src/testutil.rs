// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory AcroForm templates for tests and benchmarks.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::model::FormDocument;

/// Page content every fixture page starts with.
pub const PAGE_TEXT: &[u8] = b"BT /F1 18 Tf 50 780 Td (Application form) Tj ET\n";

/// Description of one widget to place in a fixture template.
#[derive(Debug, Clone)]
pub struct WidgetSpec {
    pub name: Option<String>,
    pub field_type: &'static str,
    pub flags: i64,
    pub rect: Option<[f32; 4]>,
    pub value: Option<Object>,
    /// State names that get an `/AP /N` stream (buttons).
    pub states: Vec<&'static str>,
    /// Give a text field a cached `/AP /N` stream.
    pub text_appearance: bool,
    pub annotation_flags: i64,
    pub page: usize,
}

impl WidgetSpec {
    fn new(name: &str, field_type: &'static str, rect: [f32; 4]) -> Self {
        Self {
            name: Some(name.to_string()),
            field_type,
            flags: 0,
            rect: Some(rect),
            value: None,
            states: Vec::new(),
            text_appearance: false,
            annotation_flags: 4,
            page: 0,
        }
    }

    pub fn text(name: &str, rect: [f32; 4]) -> Self {
        Self::new(name, "Tx", rect)
    }

    pub fn checkbox(name: &str, rect: [f32; 4]) -> Self {
        Self::new(name, "Btn", rect)
    }

    pub fn with_states(mut self, states: &[&'static str]) -> Self {
        self.states = states.to_vec();
        self
    }

    pub fn with_text_appearance(mut self) -> Self {
        self.text_appearance = true;
        self
    }

    pub fn with_value(mut self, value: Object) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_raw_name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_string);
        self
    }

    pub fn with_flags(mut self, flags: i64) -> Self {
        self.flags = flags;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.annotation_flags = 2;
        self
    }

    pub fn without_rect(mut self) -> Self {
        self.rect = None;
        self
    }

    pub fn with_rect(mut self, rect: [f32; 4]) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }
}

pub fn rect_object(rect: [f32; 4]) -> Object {
    Object::Array(rect.iter().map(|v| Object::Real(*v)).collect())
}

/// Builds a small A4 template with Helvetica page text and an AcroForm.
pub struct TemplateBuilder {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    annots: Vec<Vec<Object>>,
    fields: Vec<Object>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::with_pages(1)
    }

    pub fn with_pages(count: usize) -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut page_ids = Vec::with_capacity(count);
        for _ in 0..count {
            let content_id =
                document.add_object(Stream::new(Dictionary::new(), PAGE_TEXT.to_vec()));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            page_ids.push(page_id);
        }

        let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count as i64,
            }),
        );

        Self {
            document,
            pages_id,
            annots: vec![Vec::new(); count],
            page_ids,
            fields: Vec::new(),
        }
    }

    fn state_stream(&mut self, rect: [f32; 4], on: bool) -> ObjectId {
        let width = rect[2] - rect[0];
        let height = rect[3] - rect[1];
        let content = if on {
            b"0 g 2 2 m 8 8 l S\n".to_vec()
        } else {
            Vec::new()
        };
        self.document.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), Object::Real(width), Object::Real(height)],
            },
            content,
        ))
    }

    /// Add a merged field/widget annotation and register it in `/Fields`.
    pub fn add_widget(&mut self, spec: WidgetSpec) -> ObjectId {
        let mut widget = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => spec.field_type,
            "F" => spec.annotation_flags,
            "P" => self.page_ids[spec.page],
        };
        if let Some(name) = &spec.name {
            widget.set("T", Object::string_literal(name.as_bytes().to_vec()));
        }
        if spec.flags != 0 {
            widget.set("Ff", spec.flags);
        }
        if let Some(rect) = spec.rect {
            widget.set("Rect", rect_object(rect));
        }
        if let Some(value) = spec.value.clone() {
            widget.set("V", value);
        }

        let rect = spec.rect.unwrap_or([0.0, 0.0, 10.0, 10.0]);
        if !spec.states.is_empty() {
            let mut normal = Dictionary::new();
            for state in &spec.states {
                let id = self.state_stream(rect, *state != "Off");
                normal.set(state.as_bytes().to_vec(), id);
            }
            widget.set("AP", dictionary! { "N" => normal });
            widget.set("AS", "Off");
        }
        if spec.text_appearance {
            let width = rect[2] - rect[0];
            let height = rect[3] - rect[1];
            let id = self.document.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), Object::Real(width), Object::Real(height)],
                },
                b"/Tx BMC BT /Helv 10 Tf 2 5 Td (cached) Tj ET EMC\n".to_vec(),
            ));
            widget.set("AP", dictionary! { "N" => id });
        }

        let id = self.document.add_object(widget);
        self.annots[spec.page].push(Object::Reference(id));
        self.fields.push(Object::Reference(id));
        id
    }

    /// Add a radio group: one parent field with one kid widget per export value.
    pub fn add_radio_group(&mut self, name: &str, kids: &[(&'static str, [f32; 4])]) -> ObjectId {
        let parent_id = self.document.new_object_id();
        let mut kid_refs = Vec::new();
        for (export, rect) in kids {
            let on_id = self.state_stream(*rect, true);
            let off_id = self.state_stream(*rect, false);
            let mut normal = Dictionary::new();
            normal.set(export.as_bytes().to_vec(), on_id);
            normal.set("Off", off_id);
            let kid_id = self.document.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "Parent" => parent_id,
                "Rect" => rect_object(*rect),
                "AP" => dictionary! { "N" => normal },
                "AS" => "Off",
                "F" => 4,
            });
            self.annots[0].push(Object::Reference(kid_id));
            kid_refs.push(Object::Reference(kid_id));
        }
        self.document.objects.insert(
            parent_id,
            Object::Dictionary(dictionary! {
                "FT" => "Btn",
                "Ff" => 1i64 << 15,
                "T" => Object::string_literal(name.as_bytes().to_vec()),
                "Kids" => kid_refs,
            }),
        );
        self.fields.push(Object::Reference(parent_id));
        parent_id
    }

    /// Add a non-widget link annotation to the first page.
    pub fn add_link_annotation(&mut self, rect: [f32; 4]) -> ObjectId {
        let id = self.document.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => rect_object(rect),
            "Border" => vec![0.into(), 0.into(), 0.into()],
        });
        self.annots[0].push(Object::Reference(id));
        id
    }

    pub fn into_document(mut self) -> Document {
        for (page_id, annots) in self.page_ids.iter().zip(self.annots.iter()) {
            if annots.is_empty() {
                continue;
            }
            if let Ok(Object::Dictionary(page)) = self.document.get_object_mut(*page_id) {
                page.set("Annots", annots.clone());
            }
        }

        let helv_id = self.document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        };
        if !self.fields.is_empty() {
            catalog.set(
                "AcroForm",
                dictionary! {
                    "Fields" => self.fields.clone(),
                    "DR" => dictionary! { "Font" => dictionary! { "Helv" => helv_id } },
                    "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
                },
            );
        }
        let catalog_id = self.document.add_object(catalog);
        self.document.trailer.set("Root", catalog_id);
        self.document
    }

    pub fn into_form(self) -> FormDocument {
        FormDocument::from_document(self.into_document())
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let mut document = self.into_document();
        let mut output = Vec::new();
        document
            .save_to(&mut output)
            .expect("fixture document serialises");
        output
    }
}

impl Default for TemplateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded page content of every page, in order.
pub fn page_contents(document: &Document) -> Vec<String> {
    document
        .get_pages()
        .values()
        .map(|id| {
            let bytes = document.get_page_content(*id).unwrap_or_default();
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .collect()
}

/// Route engine logs to the test harness output.
#[cfg(test)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
