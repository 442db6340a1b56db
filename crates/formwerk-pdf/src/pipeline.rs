// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestrator — sequences resolve, bind, synthesize and flatten, and
// writes the result atomically.
//
// Output goes to a uniquely named temporary file next to the destination and is
// renamed into place only after the whole run succeeded, so a reader never sees
// a partially written PDF and a failed run leaves the destination untouched.

use std::io::Write;
use std::path::Path;

use formwerk_core::error::{FormwerkError, Result};
use formwerk_core::integrity::hash_bytes;
use formwerk_core::{FieldValues, FillConfig, FillReport};
use tracing::{debug, info, instrument};

use crate::appearance::synthesize_appearances;
use crate::bind::bind_values;
use crate::flatten::flatten_document;
use crate::fonts::EmbeddedFont;
use crate::model::FormDocument;
use crate::resolve::resolve_fields;

/// A filled document held in memory.
#[derive(Debug, Clone)]
pub struct FilledDocument {
    pub bytes: Vec<u8>,
    pub report: FillReport,
}

/// Fills and flattens AcroForm templates with one configuration.
///
/// Each call owns its own document; a filler holds no per-run state and can be
/// reused.
#[derive(Debug)]
pub struct FormFiller {
    config: FillConfig,
    font: EmbeddedFont,
}

impl FormFiller {
    /// Validate `config` and load its text font: the configured font file,
    /// or the bundled DejaVu Sans.
    pub fn new(config: FillConfig) -> Result<Self> {
        config.validate()?;
        let font = match &config.font_file {
            Some(path) => EmbeddedFont::load(path)?,
            None => EmbeddedFont::bundled()?,
        };
        Ok(Self { config, font })
    }

    /// Use an already loaded font for drawn text.
    pub fn with_font(mut self, font: EmbeddedFont) -> Self {
        self.font = font;
        self
    }

    pub fn config(&self) -> &FillConfig {
        &self.config
    }

    /// Fill `template` with `values` and flatten it, entirely in memory.
    #[instrument(skip_all, fields(template_bytes = template.len(), values = values.len()))]
    pub fn fill_bytes(&self, template: &[u8], values: &FieldValues) -> Result<FilledDocument> {
        let mut form = FormDocument::from_bytes(template)?;

        let mut resolved = resolve_fields(&form);
        let fields_resolved = resolved.fields.len();
        let fields_bound = bind_values(&mut form, &mut resolved.fields, values)?;

        let mut warnings = std::mem::take(&mut resolved.warnings);
        warnings.extend(synthesize_appearances(&mut form, &resolved.fields));
        warnings.extend(flatten_document(
            &mut form,
            &resolved,
            &self.config,
            Some(&self.font),
        )?);
        form.verify_flattened()?;

        let bytes = form.to_bytes(self.config.compress_output)?;
        let report = FillReport {
            fields_resolved,
            fields_bound,
            warnings,
            output_sha256: hash_bytes(&bytes),
        };
        info!(
            fields_resolved,
            fields_bound,
            warnings = report.warnings.len(),
            sha256 = %report.output_sha256,
            "Form filled and flattened"
        );
        Ok(FilledDocument { bytes, report })
    }

    /// Fill `template` with `values` but keep the form interactive, asking
    /// viewers to regenerate appearances.
    #[instrument(skip_all, fields(template_bytes = template.len(), values = values.len()))]
    pub fn fill_interactive_bytes(
        &self,
        template: &[u8],
        values: &FieldValues,
    ) -> Result<FilledDocument> {
        let mut form = FormDocument::from_bytes(template)?;

        let mut resolved = resolve_fields(&form);
        let fields_resolved = resolved.fields.len();
        let fields_bound = bind_values(&mut form, &mut resolved.fields, values)?;

        let mut warnings = std::mem::take(&mut resolved.warnings);
        warnings.extend(synthesize_appearances(&mut form, &resolved.fields));
        form.set_need_appearances()?;

        let bytes = form.to_bytes(self.config.compress_output)?;
        let report = FillReport {
            fields_resolved,
            fields_bound,
            warnings,
            output_sha256: hash_bytes(&bytes),
        };
        info!(fields_resolved, fields_bound, "Form filled (interactive)");
        Ok(FilledDocument { bytes, report })
    }

    /// Fill the template at `template` and atomically write the flattened
    /// result to `output`.
    #[instrument(skip_all, fields(template = %template.as_ref().display(), output = %output.as_ref().display()))]
    pub fn fill_file(
        &self,
        template: impl AsRef<Path>,
        output: impl AsRef<Path>,
        values: &FieldValues,
    ) -> Result<FillReport> {
        let template = template.as_ref();
        let data = std::fs::read(template).map_err(|err| {
            FormwerkError::TemplateRead(format!("{}: {}", template.display(), err))
        })?;

        let filled = self.fill_bytes(&data, values)?;
        write_atomically(output.as_ref(), &filled.bytes)?;
        Ok(filled.report)
    }
}

/// Fill and flatten with the default configuration.
pub fn fill_pdf(
    template: impl AsRef<Path>,
    output: impl AsRef<Path>,
    values: &FieldValues,
) -> Result<FillReport> {
    FormFiller::new(FillConfig::default())?.fill_file(template, output, values)
}

fn output_error(path: &Path, err: impl std::fmt::Display) -> FormwerkError {
    FormwerkError::OutputWrite(format!("{}: {}", path.display(), err))
}

/// Write `bytes` to a temporary file beside `path`, then rename it over `path`.
/// The temporary file is deleted if anything fails before the rename.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory).map_err(|err| output_error(directory, err))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".formwerk-")
        .suffix(".pdf.tmp")
        .tempfile_in(directory)
        .map_err(|err| output_error(directory, err))?;
    debug!(temp = %temp.path().display(), "Writing temporary output");

    temp.write_all(bytes).map_err(|err| output_error(temp.path(), err))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| output_error(temp.path(), err))?;
    temp.persist(path).map_err(|err| output_error(path, err.error))?;

    info!(path = %path.display(), bytes = bytes.len(), "Output written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{PAGE_TEXT, TemplateBuilder, WidgetSpec, init_tracing, page_contents};
    use formwerk_core::{FillWarning, FlattenStrategy};
    use lopdf::Document;
    use lopdf::content::Content;

    fn scenario_template() -> Vec<u8> {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(WidgetSpec::text("date", [50.0, 700.0, 250.0, 720.0]));
        builder.add_widget(WidgetSpec::text("company", [50.0, 650.0, 300.0, 670.0]));
        builder.add_widget(WidgetSpec::checkbox("use_lift", [300.0, 700.0, 312.0, 712.0]));
        builder.to_bytes()
    }

    fn scenario_values() -> FieldValues {
        [
            ("date", "07.08.2025"),
            ("company", "ООО Ромашка"),
            ("use_lift", "да"),
        ]
        .into_iter()
        .collect()
    }

    fn uncompressed(strategy: FlattenStrategy) -> FormFiller {
        FormFiller::new(FillConfig {
            strategy,
            compress_output: false,
            ..FillConfig::default()
        })
        .unwrap()
    }

    /// Page text as a viewer would copy it.
    fn extracted_text(bytes: &[u8]) -> String {
        let document = Document::load_mem(bytes).unwrap();
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        document.extract_text(&pages).unwrap()
    }

    /// `BaseFont` of every CID font in the document.
    fn cid_font_names(bytes: &[u8]) -> Vec<Vec<u8>> {
        let document = Document::load_mem(bytes).unwrap();
        document
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dict| {
                matches!(dict.get(b"Subtype"), Ok(lopdf::Object::Name(name)) if name == b"CIDFontType2")
            })
            .map(|dict| dict.get(b"BaseFont").unwrap().as_name().unwrap().to_vec())
            .collect()
    }

    fn has_acroform(bytes: &[u8]) -> bool {
        FormDocument::from_bytes(bytes).unwrap().acroform().is_some()
    }

    #[test]
    fn scenario_fills_and_flattens() {
        init_tracing();
        for strategy in [FlattenStrategy::AppearanceReplay, FlattenStrategy::DirectDraw] {
            let filled = uncompressed(strategy)
                .fill_bytes(&scenario_template(), &scenario_values())
                .unwrap();

            assert!(!has_acroform(&filled.bytes));
            let reloaded = FormDocument::from_bytes(&filled.bytes).unwrap();
            assert!(reloaded.verify_flattened().is_ok());

            let text = extracted_text(&filled.bytes);
            assert!(text.contains("07.08.2025"), "{strategy:?}: {text}");
            assert!(text.contains("ООО Ромашка"), "{strategy:?}: {text}");
            assert!(filled.report.warnings.is_empty(), "{:?}", filled.report.warnings);
            assert_eq!(cid_font_names(&filled.bytes), vec![b"DejaVuSans".to_vec()]);

            assert_eq!(filled.report.fields_resolved, 3);
            assert_eq!(filled.report.fields_bound, 3);
            assert_eq!(filled.report.output_sha256, hash_bytes(&filled.bytes));
        }
    }

    #[test]
    fn scenario_checkmark_lands_in_its_rectangle() {
        let filled = uncompressed(FlattenStrategy::AppearanceReplay)
            .fill_bytes(&scenario_template(), &scenario_values())
            .unwrap();
        let document = Document::load_mem(&filled.bytes).unwrap();
        let page_id = *document.get_pages().values().next().unwrap();
        let content = document.get_page_content(page_id).unwrap();
        let operations = Content::decode(&content).unwrap().operations;

        let cm = operations.iter().find(|op| op.operator == "cm").unwrap();
        let origin: Vec<f32> = cm.operands[4..]
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect();
        assert!((origin[0] - 300.0).abs() < 0.01);
        assert!((origin[1] - 700.0).abs() < 0.01);
        assert!(operations.iter().any(|op| op.operator == "Do"));
    }

    #[test]
    fn unknown_field_names_are_ignored() {
        let mut values = scenario_values();
        values.insert("no_such_field", "whatever");

        let filled = uncompressed(FlattenStrategy::DirectDraw)
            .fill_bytes(&scenario_template(), &values)
            .unwrap();
        assert!(extracted_text(&filled.bytes).contains("07.08.2025"));
        assert_eq!(filled.report.fields_bound, 3);
    }

    #[test]
    fn missing_rectangle_is_a_warning() {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(WidgetSpec::text("date", [50.0, 700.0, 250.0, 720.0]));
        builder.add_widget(WidgetSpec::text("broken", [0.0, 0.0, 0.0, 0.0]).without_rect());
        let values: FieldValues = [("date", "today"), ("broken", "x")].into_iter().collect();

        let filled = uncompressed(FlattenStrategy::DirectDraw)
            .fill_bytes(&builder.to_bytes(), &values)
            .unwrap();
        assert!(filled.report.warnings.iter().any(|w| matches!(
            w,
            FillWarning::FieldResolution { name: Some(name), .. } if name == "broken"
        )));
        assert!(extracted_text(&filled.bytes).contains("today"));
        assert!(!has_acroform(&filled.bytes));
    }

    #[test]
    fn refilling_flattened_output_is_a_no_op() {
        let filler = uncompressed(FlattenStrategy::DirectDraw);
        let first = filler
            .fill_bytes(&scenario_template(), &scenario_values())
            .unwrap();
        let second = filler.fill_bytes(&first.bytes, &scenario_values()).unwrap();

        assert_eq!(second.report.fields_resolved, 0);
        assert_eq!(second.report.fields_bound, 0);
        let before = page_contents(&Document::load_mem(&first.bytes).unwrap());
        let after = page_contents(&Document::load_mem(&second.bytes).unwrap());
        assert_eq!(before, after);
    }

    #[test]
    fn template_without_form_passes_through() {
        let bytes = TemplateBuilder::new().to_bytes();
        let filled = uncompressed(FlattenStrategy::AppearanceReplay)
            .fill_bytes(&bytes, &scenario_values())
            .unwrap();
        let contents = page_contents(&Document::load_mem(&filled.bytes).unwrap());
        assert_eq!(contents[0].as_bytes(), PAGE_TEXT);
    }

    #[test]
    fn interactive_mode_keeps_the_form() {
        let filled = uncompressed(FlattenStrategy::AppearanceReplay)
            .fill_interactive_bytes(&scenario_template(), &scenario_values())
            .unwrap();
        let form = FormDocument::from_bytes(&filled.bytes).unwrap();
        let acroform = form.acroform().unwrap();
        assert_eq!(
            acroform.get(b"NeedAppearances").unwrap(),
            &lopdf::Object::Boolean(true)
        );
        assert_eq!(resolve_fields(&form).fields.len(), 3);
    }

    #[test]
    fn corrupt_template_is_fatal() {
        let filler = FormFiller::new(FillConfig::default()).unwrap();
        let result = filler.fill_bytes(b"definitely not a pdf", &FieldValues::new());
        assert!(matches!(result, Err(FormwerkError::TemplateRead(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = FillConfig {
            min_font_size: 0.0,
            ..FillConfig::default()
        };
        assert!(matches!(FormFiller::new(config), Err(FormwerkError::Config(_))));
    }

    #[test]
    fn missing_font_file_is_rejected() {
        let config = FillConfig {
            font_file: Some("/nonexistent/font.ttf".into()),
            ..FillConfig::default()
        };
        assert!(matches!(FormFiller::new(config), Err(FormwerkError::Font(_))));
    }

    #[test]
    fn configured_font_file_replaces_bundled_font() {
        let dir = tempfile::tempdir().unwrap();
        let font_path = dir.path().join("Custom Sans.ttf");
        std::fs::write(&font_path, crate::fonts::BUNDLED_FONT).unwrap();
        let filler = FormFiller::new(FillConfig {
            strategy: FlattenStrategy::DirectDraw,
            compress_output: false,
            font_file: Some(font_path),
            ..FillConfig::default()
        })
        .unwrap();

        let filled = filler
            .fill_bytes(&scenario_template(), &scenario_values())
            .unwrap();
        assert_eq!(cid_font_names(&filled.bytes), vec![b"CustomSans".to_vec()]);
        assert!(extracted_text(&filled.bytes).contains("ООО Ромашка"));
    }

    #[test]
    fn glyphs_missing_from_the_font_are_reported() {
        let mut builder = TemplateBuilder::new();
        builder.add_widget(WidgetSpec::text("company", [50.0, 650.0, 300.0, 670.0]));
        let values: FieldValues = [("company", "Ромашка 中")].into_iter().collect();

        let filled = uncompressed(FlattenStrategy::DirectDraw)
            .fill_bytes(&builder.to_bytes(), &values)
            .unwrap();
        assert_eq!(
            filled.report.warnings,
            vec![FillWarning::UnencodableText {
                name: "company".into(),
                replaced: 1
            }]
        );
        assert!(extracted_text(&filled.bytes).contains("Ромашка ?"));
    }

    #[test]
    fn fill_file_writes_output_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.pdf");
        std::fs::write(&template, scenario_template()).unwrap();
        let output = dir.path().join("out").join("filled.pdf");

        let report = fill_pdf(&template, &output, &scenario_values()).unwrap();
        let written = std::fs::read(&output).unwrap();
        assert_eq!(report.output_sha256, hash_bytes(&written));
        assert!(!has_acroform(&written));

        // Only the output remains; no temporary files are left behind.
        let leftovers: Vec<_> = std::fs::read_dir(output.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("filled.pdf")]);
    }

    #[test]
    fn failed_run_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.pdf");
        std::fs::write(&template, b"not a pdf").unwrap();
        let output = dir.path().join("filled.pdf");
        std::fs::write(&output, b"previous").unwrap();

        let result = fill_pdf(&template, &output, &scenario_values());
        assert!(matches!(result, Err(FormwerkError::TemplateRead(_))));
        assert_eq!(std::fs::read(&output).unwrap(), b"previous");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn missing_template_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = fill_pdf(
            dir.path().join("absent.pdf"),
            dir.path().join("out.pdf"),
            &FieldValues::new(),
        );
        assert!(matches!(result, Err(FormwerkError::TemplateRead(_))));
        assert!(!dir.path().join("out.pdf").exists());
    }

    #[test]
    fn unwritable_destination_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.pdf");
        std::fs::write(&template, scenario_template()).unwrap();
        // A directory cannot be replaced by the output file.
        let output = dir.path().join("taken");
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("keep"), b"x").unwrap();

        let result = fill_pdf(&template, &output, &scenario_values());
        assert!(matches!(result, Err(FormwerkError::OutputWrite(_))));
        assert!(output.join("keep").exists());
        let temps = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(".formwerk-")
            })
            .count();
        assert_eq!(temps, 0);
    }
}
