// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fonts for drawn field text — an embedded TrueType font (bundled DejaVu Sans
// by default) written as a Type0/Identity-H composite font, or built-in
// Helvetica (WinAnsiEncoding).

use std::collections::BTreeMap;
use std::path::Path;

use formwerk_core::error::{FormwerkError, Result};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, instrument};
use ttf_parser::Face;

use crate::model::FormDocument;

/// Helvetica advance widths (1/1000 em) for codes 0x20..=0x7E.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0x30
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 0x50
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 0x60
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 0x70
];

/// Width used for WinAnsi codes outside the ASCII table.
const HELVETICA_DEFAULT_WIDTH: u16 = 556;
const HELVETICA_DESCENT: f32 = 0.207;

/// Map a character to its WinAnsiEncoding byte.
fn win_ansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => {
            let byte = match ch {
                '€' => 0x80,
                '‚' => 0x82,
                'ƒ' => 0x83,
                '„' => 0x84,
                '…' => 0x85,
                '†' => 0x86,
                '‡' => 0x87,
                'ˆ' => 0x88,
                '‰' => 0x89,
                'Š' => 0x8A,
                '‹' => 0x8B,
                'Œ' => 0x8C,
                'Ž' => 0x8E,
                '‘' => 0x91,
                '’' => 0x92,
                '“' => 0x93,
                '”' => 0x94,
                '•' => 0x95,
                '–' => 0x96,
                '—' => 0x97,
                '˜' => 0x98,
                '™' => 0x99,
                'š' => 0x9A,
                '›' => 0x9B,
                'œ' => 0x9C,
                'ž' => 0x9E,
                'Ÿ' => 0x9F,
                _ => return None,
            };
            Some(byte)
        }
    }
}

fn helvetica_width(byte: u8) -> u16 {
    match byte {
        0x20..=0x7E => HELVETICA_WIDTHS[(byte - 0x20) as usize],
        _ => HELVETICA_DEFAULT_WIDTH,
    }
}

// -- Embedded TrueType --------------------------------------------------------

/// A TrueType font program, with the metrics needed to embed it.
#[derive(Debug, Clone)]
pub struct EmbeddedFont {
    name: String,
    data: Vec<u8>,
    units_per_em: f32,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    bbox: [i16; 4],
}

/// DejaVu Sans, the default text font. Covers Latin, Cyrillic and Greek.
/// License: `assets/fonts/LICENSE-DejaVu.txt`.
pub const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

impl EmbeddedFont {
    /// The bundled DejaVu Sans.
    pub fn bundled() -> Result<Self> {
        Self::from_bytes("DejaVuSans", BUNDLED_FONT.to_vec())
    }

    /// Load and validate a `.ttf` file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref).map_err(|err| {
            FormwerkError::Font(format!("failed to read {}: {}", path_ref.display(), err))
        })?;
        let stem = path_ref
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "EmbeddedFont".into());
        Self::from_bytes(&stem, data)
    }

    pub fn from_bytes(name: &str, data: Vec<u8>) -> Result<Self> {
        if data.starts_with(b"OTTO") {
            return Err(FormwerkError::Font(
                "CFF-flavoured OpenType fonts are not supported; use a TrueType font".into(),
            ));
        }
        let face = Face::parse(&data, 0)
            .map_err(|err| FormwerkError::Font(format!("invalid font {}: {}", name, err)))?;

        let global = face.global_bounding_box();
        let font = Self {
            name: sanitize_font_name(name),
            units_per_em: f32::from(face.units_per_em().max(1)),
            ascent: face.ascender(),
            descent: face.descender(),
            cap_height: face.capital_height().unwrap_or_else(|| face.ascender()),
            bbox: [global.x_min, global.y_min, global.x_max, global.y_max],
            data,
        };
        info!(font = %font.name, "Text font loaded");
        Ok(font)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed face, for a batch of glyph lookups. `from_bytes` already
    /// parsed the same data, so this only fails on a corrupted clone.
    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }

    fn scaled(&self, units: f32) -> i64 {
        (units * 1000.0 / self.units_per_em).round() as i64
    }
}

/// Glyph id and advance (font units) for `ch`, if the face covers it.
fn glyph(face: &Face<'_>, ch: char) -> Option<(u16, u16)> {
    let gid = face.glyph_index(ch)?;
    let advance = face.glyph_hor_advance(gid).unwrap_or(0);
    Some((gid.0, advance))
}

/// Strip characters PDF names cannot carry unescaped.
fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".into()
    } else {
        cleaned
    }
}

// -- Text font selection ------------------------------------------------------

/// The font drawn field text is set in.
#[derive(Debug, Clone, Copy)]
pub enum TextFont<'a> {
    Helvetica,
    Embedded(&'a EmbeddedFont),
}

/// Bytes ready for a `Tj` operator.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    pub format: StringFormat,
    /// Characters the font could not show (drawn as `?`).
    pub replaced: usize,
}

/// Glyphs used from an embedded font, for `/W` and `/ToUnicode`.
#[derive(Debug, Default)]
pub struct GlyphUsage {
    glyphs: BTreeMap<u16, (char, u16)>,
}

impl GlyphUsage {
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl TextFont<'_> {
    /// Rendered width of `text` at `size` points.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        match self {
            TextFont::Helvetica => {
                let units: u32 = text
                    .chars()
                    .map(|ch| u32::from(helvetica_width(win_ansi_byte(ch).unwrap_or(b'?'))))
                    .sum();
                units as f32 * size / 1000.0
            }
            TextFont::Embedded(font) => {
                let Some(face) = font.face() else {
                    return 0.0;
                };
                let fallback = glyph(&face, '?').map(|(_, adv)| adv).unwrap_or(0);
                let units: f32 = text
                    .chars()
                    .map(|ch| f32::from(glyph(&face, ch).map(|(_, adv)| adv).unwrap_or(fallback)))
                    .sum();
                units * size / font.units_per_em
            }
        }
    }

    /// Depth of the descender below the baseline, as a fraction of the size.
    pub fn descent(&self) -> f32 {
        match self {
            TextFont::Helvetica => HELVETICA_DESCENT,
            TextFont::Embedded(font) => (f32::from(font.descent) / font.units_per_em).abs(),
        }
    }

    /// Encode `text` for this font, recording embedded glyphs in `usage`.
    pub fn encode(&self, text: &str, usage: &mut GlyphUsage) -> EncodedText {
        let mut replaced = 0;
        match self {
            TextFont::Helvetica => {
                let bytes = text
                    .chars()
                    .map(|ch| {
                        win_ansi_byte(ch).unwrap_or_else(|| {
                            replaced += 1;
                            b'?'
                        })
                    })
                    .collect();
                EncodedText {
                    bytes,
                    format: StringFormat::Literal,
                    replaced,
                }
            }
            TextFont::Embedded(font) => {
                let face = font.face();
                let lookup = |ch: char| face.as_ref().and_then(|face| glyph(face, ch));
                let fallback = lookup('?').map(|(gid, adv)| ('?', gid, adv));
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for ch in text.chars() {
                    let found = match lookup(ch) {
                        Some((gid, adv)) => Some((ch, gid, adv)),
                        None => {
                            replaced += 1;
                            fallback
                        }
                    };
                    let (mapped, gid, adv) = found.unwrap_or(('?', 0, 0));
                    usage.glyphs.entry(gid).or_insert((mapped, adv));
                    bytes.extend_from_slice(&gid.to_be_bytes());
                }
                EncodedText {
                    bytes,
                    format: StringFormat::Hexadecimal,
                    replaced,
                }
            }
        }
    }
}

// -- Font objects -------------------------------------------------------------

/// The Helvetica font dictionary used for drawn text.
pub fn helvetica_dictionary() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Write the Type0 font for `font` at the reserved `type0_id`, covering the
/// glyphs recorded in `usage`.
pub fn write_embedded_font(
    form: &mut FormDocument,
    font: &EmbeddedFont,
    usage: &GlyphUsage,
    type0_id: ObjectId,
) {
    let mut file_dict = Dictionary::new();
    file_dict.set("Length1", font.data.len() as i64);
    let file_id = form.add_object(Stream::new(file_dict, font.data.clone()));

    let descriptor_id = form.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => font.name.as_str(),
        "Flags" => 32,
        "FontBBox" => font
            .bbox
            .iter()
            .map(|v| Object::Integer(font.scaled(f32::from(*v))))
            .collect::<Vec<_>>(),
        "ItalicAngle" => 0,
        "Ascent" => font.scaled(f32::from(font.ascent)),
        "Descent" => font.scaled(f32::from(font.descent)),
        "CapHeight" => font.scaled(f32::from(font.cap_height)),
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    let mut widths = Vec::with_capacity(usage.glyphs.len() * 2);
    for (gid, (_, advance)) in &usage.glyphs {
        widths.push(Object::Integer(i64::from(*gid)));
        widths.push(Object::Array(vec![Object::Integer(
            font.scaled(f32::from(*advance)),
        )]));
    }

    let cid_font_id = form.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => font.name.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "W" => widths,
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id = form.add_object(Stream::new(
        Dictionary::new(),
        to_unicode_cmap(usage).into_bytes(),
    ));

    form.insert_object(
        type0_id,
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => font.name.as_str(),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        },
    );
    debug!(font = %font.name, glyphs = usage.glyphs.len(), "Embedded font written");
}

fn to_unicode_cmap(usage: &GlyphUsage) -> String {
    let entries: Vec<(u16, char)> = usage.glyphs.iter().map(|(g, (c, _))| (*g, *c)).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            out.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TemplateBuilder;

    fn gids(encoded: &EncodedText) -> Vec<u16> {
        encoded
            .bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn helvetica_measures_with_afm_widths() {
        // "Hi" = 722 + 222 units.
        let width = TextFont::Helvetica.text_width("Hi", 10.0);
        assert!((width - 9.44).abs() < 1e-4);
    }

    #[test]
    fn win_ansi_covers_latin_and_typographic_quotes() {
        let mut usage = GlyphUsage::default();
        let encoded = TextFont::Helvetica.encode("café “ok” €5", &mut usage);
        assert_eq!(encoded.replaced, 0);
        assert_eq!(encoded.bytes[3], 0xE9);
        assert!(encoded.bytes.contains(&0x93));
        assert!(encoded.bytes.contains(&0x80));
        assert!(usage.is_empty());
    }

    #[test]
    fn cyrillic_is_replaced_under_helvetica() {
        let mut usage = GlyphUsage::default();
        let encoded = TextFont::Helvetica.encode("ООО Ромашка", &mut usage);
        assert_eq!(encoded.replaced, 10);
        assert_eq!(encoded.bytes, b"??? ???????".to_vec());
    }

    #[test]
    fn bundled_font_measures_cyrillic() {
        let font = EmbeddedFont::bundled().unwrap();
        assert_eq!(font.name(), "DejaVuSans");
        let text = TextFont::Embedded(&font);

        let width = text.text_width("ООО Ромашка", 12.0);
        assert!(width > 0.0);
        assert!((text.text_width("ООО Ромашка", 6.0) * 2.0 - width).abs() < 1e-3);
        // Every Cyrillic letter has its own advance, not the `?` fallback.
        let question = text.text_width("?", 12.0);
        assert!((text.text_width("Ш", 12.0) - question).abs() > 0.1);
    }

    #[test]
    fn bundled_font_encodes_cyrillic_as_glyph_ids() {
        let font = EmbeddedFont::bundled().unwrap();
        let mut usage = GlyphUsage::default();
        let encoded = TextFont::Embedded(&font).encode("ООО Ромашка", &mut usage);

        assert_eq!(encoded.replaced, 0);
        assert_eq!(encoded.format, StringFormat::Hexadecimal);
        let gids = gids(&encoded);
        assert_eq!(gids.len(), 11);
        assert!(gids.iter().all(|gid| *gid != 0));
        assert_eq!(gids[0], gids[1]);
        // О, space, Р, о, м, а, ш, к
        assert_eq!(usage.glyphs.len(), 8);
    }

    #[test]
    fn missing_glyphs_fall_back_to_question_mark() {
        let font = EmbeddedFont::bundled().unwrap();
        let mut usage = GlyphUsage::default();
        let encoded = TextFont::Embedded(&font).encode("a中b", &mut usage);
        assert_eq!(encoded.replaced, 1);

        let mut plain = GlyphUsage::default();
        let question = TextFont::Embedded(&font).encode("?", &mut plain);
        assert_eq!(gids(&encoded)[1], gids(&question)[0]);
        assert_eq!(usage.glyphs.get(&gids(&question)[0]).map(|(ch, _)| *ch), Some('?'));
    }

    #[test]
    fn embedded_widths_cover_every_used_glyph() {
        let font = EmbeddedFont::bundled().unwrap();
        let mut usage = GlyphUsage::default();
        let encoded = TextFont::Embedded(&font).encode("ООО Ромашка 07.08.2025", &mut usage);

        let mut form = TemplateBuilder::new().into_form();
        let type0_id = form.reserve_object_id();
        write_embedded_font(&mut form, &font, &usage, type0_id);

        let type0 = form.dict(type0_id).unwrap();
        assert_eq!(type0.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");
        let descendant = type0.get(b"DescendantFonts").unwrap().as_array().unwrap()[0]
            .as_reference()
            .unwrap();
        let cid_font = form.dict(descendant).unwrap();
        assert_eq!(cid_font.get(b"Subtype").unwrap().as_name().unwrap(), b"CIDFontType2");

        let widths = cid_font.get(b"W").unwrap().as_array().unwrap();
        let mut covered = BTreeMap::new();
        for pair in widths.chunks_exact(2) {
            let gid = pair[0].as_i64().unwrap();
            let width = pair[1].as_array().unwrap()[0].as_i64().unwrap();
            covered.insert(gid, width);
        }
        for gid in gids(&encoded) {
            let width = covered.get(&i64::from(gid));
            assert!(matches!(width, Some(w) if *w > 0), "glyph {gid} has no width");
        }
    }

    #[test]
    fn non_font_bytes_rejected() {
        let result = EmbeddedFont::from_bytes("bogus", b"not a font at all".to_vec());
        assert!(matches!(result, Err(FormwerkError::Font(_))));
        let result = EmbeddedFont::from_bytes("cff", b"OTTO\0\0\0\0".to_vec());
        assert!(matches!(result, Err(FormwerkError::Font(_))));
    }

    #[test]
    fn missing_font_file_is_font_error() {
        let result = EmbeddedFont::load("/nonexistent/font.ttf");
        assert!(matches!(result, Err(FormwerkError::Font(_))));
    }

    #[test]
    fn font_names_are_sanitized() {
        assert_eq!(sanitize_font_name("PT Sans (Regular)"), "PTSansRegular");
        assert_eq!(sanitize_font_name("()"), "EmbeddedFont");
    }

    #[test]
    fn to_unicode_lists_used_glyphs() {
        let mut usage = GlyphUsage::default();
        usage.glyphs.insert(3, ('Д', 600));
        usage.glyphs.insert(7, ('\u{1F600}', 1000));
        let cmap = to_unicode_cmap(&usage);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0003> <0414>"));
        assert!(cmap.contains("<0007> <D83DDE00>"));
    }
}
