// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF text strings — decoding field names and values, normalizing names.
// New values are written with `lopdf::text_string`.

use lopdf::Object;

/// Decode a string or name object; other object types yield `None`.
///
/// Strings go through lopdf's text-string decoder (UTF-16BE, UTF-8 or
/// PDFDocEncoding). Name bytes are read as PDFDocEncoding too. Malformed
/// UTF-16 yields `None`.
pub fn decode_object_text(object: &Object) -> Option<String> {
    let decoded = match object {
        Object::String(..) => lopdf::decode_text_string(object),
        Object::Name(name) => lopdf::decode_text_string(&Object::string_literal(name.clone())),
        _ => return None,
    };
    decoded
        .ok()
        .map(|text| text.trim_start_matches('\u{FEFF}').to_string())
}

/// Strip parenthesis artifacts left around a partial field name by some
/// producers, e.g. `(company)` → `company`. Idempotent.
pub fn normalize_field_name(raw: &str) -> String {
    raw.trim_matches(|c| c == '(' || c == ')').to_string()
}
