//! Component G: the ASCII/CSV log dialect. Reuses the format registry,
//! codec data model, clock, and reader state (components A/B/E/F) with
//! a line-oriented framer instead of the binary magic-byte one.
//!
//! Grounded on the same `fit-rs` mmap-and-scan shape as `framing.rs`,
//! adapted to lines: `fit-rs` has no text dialect, so the line splitter
//! and delimiter sniffing below follow spec.md §4.G directly.
//!
//! Design note: ArduPilot's text dialect writes already-scaled decimal
//! values for `c/C/e/E/L` fields (e.g. `47.3977`, not the raw wire
//! integer `473977000`), unlike the binary dialect. Records decoded
//! here are therefore built with `apply_multiplier = false` so
//! `Message::get_field` returns the parsed value unchanged rather than
//! re-applying a divisor meant for raw wire integers.

use std::collections::HashMap;

use crate::format::{DFFormat, FormatChar};
use crate::index::LiveMessages;
use crate::message::Message;
use crate::registry::FormatRegistry;
use crate::value::Value;

/// A file is text iff the first 8000 bytes contain the literal `FMT,`
/// (spec.md §4.G).
pub fn looks_like_text(data: &[u8]) -> bool {
    let probe = &data[..data.len().min(8000)];
    probe.windows(4).any(|w| w == b"FMT,")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    CommaSpace,
    Comma,
}

impl Delimiter {
    pub fn split<'a>(self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::CommaSpace => line.split(", ").collect(),
            Delimiter::Comma => line.split(',').collect(),
        }
    }
}

/// Sniff the delimiter from the first `FMT` line: `", "` unless that
/// line uses the no-space `","` form (spec.md §4.G).
pub fn detect_delimiter(lines: &[&str]) -> Delimiter {
    for line in lines {
        if let Some(rest) = line.strip_prefix("FMT,") {
            return if rest.starts_with(' ') { Delimiter::CommaSpace } else { Delimiter::Comma };
        }
    }
    Delimiter::CommaSpace
}

pub struct TextIndex {
    pub offsets_by_type: HashMap<String, Vec<usize>>,
}

/// Scan every line, build per-type-name offset lists (indices into
/// `lines`), and decode `FMT`/`FMTU`/`UNIT`/`MULT` rows inline so later
/// lines of that type parse correctly (spec.md §4.G indexing).
pub fn index_text<'a>(
    text: &'a str,
    registry: &mut FormatRegistry,
    messages: &mut LiveMessages,
) -> (Vec<&'a str>, TextIndex) {
    let lines: Vec<&str> = text.lines().collect();
    let delim = detect_delimiter(&lines);
    let mut index = TextIndex { offsets_by_type: HashMap::new() };

    for (line_no, line) in lines.iter().enumerate() {
        let mut fields = delim.split(line);
        // A line with 5 fields ending in ',' is missing its trailing
        // column; synthesize the empty one (spec.md §4.G special case).
        if fields.len() == 5 && line.trim_end().ends_with(',') {
            fields.push("");
        }
        let Some(&name_field) = fields.first() else { continue };
        let name = name_field.trim();
        if name.is_empty() {
            continue;
        }

        index
            .offsets_by_type
            .entry(name.to_string())
            .or_default()
            .push(line_no);

        match name {
            "FMT" => apply_text_fmt(&fields[1..], registry),
            "FMTU" => apply_text_fmtu(&fields[1..], registry),
            "UNIT" => apply_text_unit(&fields[1..], registry),
            "MULT" => apply_text_mult(&fields[1..], registry),
            _ => {
                if let Some(fmt) = registry.get_by_name(name).cloned() {
                    if fields.len() - 1 < fmt.format_spec.len() {
                        // Fewer columns than the format requires; skip (spec.md §4.G).
                        continue;
                    }
                    if !messages.contains_key(name) {
                        let values = decode_text_fields(&fmt, &fields[1..]);
                        let mut msg = Message::new(std::sync::Arc::new(fmt), values);
                        msg.apply_multiplier = false;
                        messages.insert(name.to_string(), msg);
                    }
                }
            }
        }
    }

    (lines, index)
}

pub fn apply_text_fmt(fields: &[&str], registry: &mut FormatRegistry) {
    // Type, Length, Name, Format[, Columns]
    if fields.len() < 4 {
        return;
    }
    let Ok(type_id) = fields[0].trim().parse::<u16>() else { return };
    let Ok(length) = fields[1].trim().parse::<usize>() else { return };
    let name = fields[2].trim().to_string();
    let format_str = fields[3].trim();
    // A FMT line for FMT itself may omit the trailing Columns token;
    // substitute the canonical list (spec.md §4.G, §9 open question c).
    let columns = if fields.len() >= 5 {
        fields[4].trim().to_string()
    } else {
        crate::format::FMT_COLUMNS.to_string()
    };
    if let Ok(fmt) = DFFormat::new(type_id as u8, length, name, format_str, &columns) {
        registry.insert(fmt);
    }
}

pub fn apply_text_fmtu(fields: &[&str], registry: &mut FormatRegistry) {
    if fields.len() < 3 {
        return;
    }
    let Ok(target_type) = fields[0].trim().parse::<u16>() else { return };
    registry.set_units(target_type as u8, fields[1].trim());
    registry.set_multipliers(target_type as u8, fields[2].trim());
}

fn numeric_key_char(field: &str) -> Option<char> {
    let field = field.trim();
    // Numeric unit/mult key fields are characters; convert to single-char
    // strings (spec.md §4.G special case).
    if let Ok(code) = field.parse::<u32>() {
        return char::from_u32(code);
    }
    field.chars().next()
}

pub fn apply_text_unit(fields: &[&str], registry: &mut FormatRegistry) {
    if fields.len() < 2 {
        return;
    }
    if let Some(id) = numeric_key_char(fields[0]) {
        registry.record_unit(id, fields[1].trim().to_string());
    }
}

pub fn apply_text_mult(fields: &[&str], registry: &mut FormatRegistry) {
    if fields.len() < 2 {
        return;
    }
    if let (Some(id), Ok(value)) = (numeric_key_char(fields[0]), fields[1].trim().parse::<f64>()) {
        registry.record_mult(id, value);
    }
}

/// Parse CSV tokens against `fmt.format_spec`. Values are stored
/// already-scaled (see module doc comment), except string/byte fields
/// which behave identically to the binary codec.
pub fn decode_text_fields(fmt: &DFFormat, fields: &[&str]) -> Vec<Value> {
    fmt.format_spec
        .iter()
        .enumerate()
        .map(|(i, fc)| {
            let tok = fields.get(i).copied().unwrap_or("").trim();
            parse_token(*fc, tok, fmt)
        })
        .collect()
}

fn parse_token(fc: FormatChar, tok: &str, fmt: &DFFormat) -> Value {
    use FormatChar::*;
    match fc {
        Array16 => {
            let mut arr = [0i16; 16];
            for (i, s) in tok.split(|c: char| c == ';' || c.is_whitespace()).filter(|s| !s.is_empty()).take(16).enumerate() {
                arr[i] = s.parse().unwrap_or(0);
            }
            Value::Array16(arr)
        }
        Int8 | ModeEnum => Value::I8(tok.parse().unwrap_or(0)),
        UInt8 => Value::U8(tok.parse().unwrap_or(0)),
        Int16 => Value::I16(tok.parse().unwrap_or(0)),
        UInt16 => Value::U16(tok.parse().unwrap_or(0)),
        Int32 => Value::I32(tok.parse().unwrap_or(0)),
        UInt32 => Value::U32(tok.parse().unwrap_or(0)),
        // Already scaled to a decimal string by the firmware (module doc
        // comment above); store as float, not as the raw wire integer type.
        CentiInt16 | CentiUInt16 | CentiInt32 | CentiUInt32 | LatLon => {
            Value::F64(tok.parse().unwrap_or(f64::NAN))
        }
        Int64 => Value::I64(tok.parse().unwrap_or(0)),
        UInt64 => Value::U64(tok.parse().unwrap_or(0)),
        Float32 | Float16 => Value::F32(tok.parse().unwrap_or(f32::NAN)),
        Float64 => Value::F64(tok.parse().unwrap_or(f64::NAN)),
        Str4 | Str16 | Str64 => {
            if fmt.name == "FILE" {
                Value::Bytes(tok.as_bytes().to_vec())
            } else {
                Value::Str(tok.as_bytes().to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_text_format() {
        let data = b"FMT, 128, 89, FMT, BBnNZ, Type,Length,Name,Format,Columns\n".to_vec();
        assert!(looks_like_text(&data));
        assert!(!looks_like_text(b"not a log"));
    }

    #[test]
    fn delimiter_sniffed_from_fmt_line() {
        let lines = vec!["FMT, 128, 89, FMT, BBnNZ, Type,Length,Name,Format,Columns"];
        assert_eq!(detect_delimiter(&lines), Delimiter::CommaSpace);
        let lines_nospace = vec!["FMT,128,89,FMT,BBnNZ,Type,Length,Name,Format,Columns"];
        assert_eq!(detect_delimiter(&lines_nospace), Delimiter::Comma);
    }

    #[test]
    fn indexes_new_type_from_text() {
        let mut registry = FormatRegistry::new();
        let mut messages = LiveMessages::new();
        let text = "FMT, 128, 89, FMT, BBnNZ, Type,Length,Name,Format,Columns\n\
                    FMT, 10, 6, XYZ, bh, A,B\n\
                    XYZ, -5, 1234\n";
        let (_lines, idx) = index_text(text, &mut registry, &mut messages);
        assert!(registry.get_by_name("XYZ").is_some());
        assert_eq!(idx.offsets_by_type.get("XYZ").map(|v| v.len()), Some(1));
    }
}
