//! Component B: decode a raw payload against a `DFFormat`, and the
//! reverse (`encode`).
//!
//! Grounded on `fit-rs`'s `DataMessage::new`/`DataField::new`
//! (`fit/data_message.rs`, `fit/data_field.rs`), which read one field at
//! a time off a shared cursor using `binread`'s `BinReaderExt`. DataFlash
//! records are flat and fixed-length per type (no per-message
//! architecture byte to branch on), so the cursor here is always
//! little-endian.

use std::io::Cursor;

use binread::BinReaderExt;

use crate::error::DecodeError;
use crate::format::{DFFormat, FormatChar};
use crate::value::{f16_to_f32, Value};

/// Decode one record's payload (the bytes after the 3-byte
/// `0xA3 0x95 <type>` header) against `format`.
pub fn decode(format: &DFFormat, payload: &[u8]) -> Result<Vec<Value>, DecodeError> {
    let needed = format.payload_len();
    if payload.len() < needed {
        return Err(DecodeError::ShortRecord {
            type_id: format.type_id,
            expected: needed,
            actual: payload.len(),
        });
    }

    let mut values = Vec::with_capacity(format.format_spec.len());
    for (i, fc) in format.format_spec.iter().enumerate() {
        let offset = format.field_offsets[i];
        let size = fc.wire_size();
        let slice = payload.get(offset..offset + size).ok_or_else(|| DecodeError::FieldUnpack {
            type_id: format.type_id,
            field: format.columns.get(i).cloned().unwrap_or_default(),
        })?;
        let mut cursor = Cursor::new(slice);
        let value = decode_one(*fc, &mut cursor, format, i)?;
        values.push(value);
    }
    Ok(values)
}

fn decode_one(
    fc: FormatChar,
    cursor: &mut Cursor<&[u8]>,
    format: &DFFormat,
    field_index: usize,
) -> Result<Value, DecodeError> {
    let bad = |_| DecodeError::FieldUnpack {
        type_id: format.type_id,
        field: format.columns.get(field_index).cloned().unwrap_or_default(),
    };
    Ok(match fc {
        FormatChar::Array16 => {
            let mut arr = [0i16; 16];
            for slot in arr.iter_mut() {
                *slot = cursor.read_le::<i16>().map_err(bad)?;
            }
            Value::Array16(arr)
        }
        FormatChar::Int8 => Value::I8(cursor.read_le::<i8>().map_err(bad)?),
        FormatChar::UInt8 => Value::U8(cursor.read_le::<u8>().map_err(bad)?),
        FormatChar::Int16 => Value::I16(cursor.read_le::<i16>().map_err(bad)?),
        FormatChar::UInt16 => Value::U16(cursor.read_le::<u16>().map_err(bad)?),
        FormatChar::Int32 => Value::I32(cursor.read_le::<i32>().map_err(bad)?),
        FormatChar::UInt32 => Value::U32(cursor.read_le::<u32>().map_err(bad)?),
        FormatChar::Int64 => Value::I64(cursor.read_le::<i64>().map_err(bad)?),
        FormatChar::UInt64 => Value::U64(cursor.read_le::<u64>().map_err(bad)?),
        FormatChar::Float32 => Value::F32(cursor.read_le::<f32>().map_err(bad)?),
        FormatChar::Float64 => Value::F64(cursor.read_le::<f64>().map_err(bad)?),
        FormatChar::Float16 => {
            let bits = cursor.read_le::<u16>().map_err(bad)?;
            Value::F32(f16_to_f32(bits))
        }
        FormatChar::CentiInt16 => Value::I16(cursor.read_le::<i16>().map_err(bad)?),
        FormatChar::CentiUInt16 => Value::U16(cursor.read_le::<u16>().map_err(bad)?),
        FormatChar::CentiInt32 => Value::I32(cursor.read_le::<i32>().map_err(bad)?),
        FormatChar::CentiUInt32 => Value::U32(cursor.read_le::<u32>().map_err(bad)?),
        FormatChar::LatLon => Value::I32(cursor.read_le::<i32>().map_err(bad)?),
        FormatChar::ModeEnum => Value::I8(cursor.read_le::<i8>().map_err(bad)?),
        FormatChar::Str4 | FormatChar::Str16 | FormatChar::Str64 => {
            let raw = cursor.get_ref();
            let bytes = if format.name == "FILE" {
                Value::Bytes(raw.to_vec())
            } else {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                Value::Str(raw[..end].to_vec())
            };
            bytes
        }
    })
}

/// Pack a decoded message's raw field values back into wire bytes,
/// including the `0xA3 0x95 <type>` header. Storage is already raw
/// (design note: scaling applies on read, not on storage), so this is a
/// direct inverse of `decode` plus the header.
pub fn encode(format: &DFFormat, values: &[Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.record_length);
    out.push(0xA3);
    out.push(0x95);
    out.push(format.type_id);

    // Re-encode special case (spec.md §4.B): prefer numeric ModeNum over
    // symbolic Mode when both exist, packing ModeNum's value into the
    // Mode column's wire slot (examples/original_source/DFReader.py's
    // `get_msgbuf`: `if name == 'Mode' and 'ModeNum' in self.fmt.columns:
    // name = 'ModeNum'`).
    let mode_slot = format.field_index("Mode").zip(format.field_index("ModeNum"));

    for (i, (fc, value)) in format.format_spec.iter().zip(values.iter()).enumerate() {
        let value = match mode_slot {
            Some((mode_idx, mode_num_idx)) if i == mode_idx => values.get(mode_num_idx).unwrap_or(value),
            _ => value,
        };
        encode_one(*fc, value, &mut out);
    }
    out
}

fn encode_one(fc: FormatChar, value: &Value, out: &mut Vec<u8>) {
    match (fc, value) {
        (FormatChar::Array16, Value::Array16(a)) => {
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        (_, Value::I8(v)) => out.push(*v as u8),
        (_, Value::U8(v)) => out.push(*v),
        (_, Value::I16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (_, Value::U16(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (_, Value::I32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (_, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (_, Value::I64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (_, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (_, Value::F32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (_, Value::F64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FormatChar::Str4 | FormatChar::Str16 | FormatChar::Str64, Value::Str(bytes)) => {
            let width = fc.wire_size();
            let mut buf = vec![0u8; width];
            let n = bytes.len().min(width);
            buf[..n].copy_from_slice(&bytes[..n]);
            out.extend_from_slice(&buf);
        }
        (FormatChar::Str4 | FormatChar::Str16 | FormatChar::Str64, Value::Bytes(bytes)) => {
            let width = fc.wire_size();
            let mut buf = vec![0u8; width];
            let n = bytes.len().min(width);
            buf[..n].copy_from_slice(&bytes[..n]);
            out.extend_from_slice(&buf);
        }
        _ => out.extend(std::iter::repeat(0u8).take(fc.wire_size())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DFFormat;

    #[test]
    fn scaling_idempotence_latlon() {
        // format L: wire 473977000 -> 47.3977 via /1e7 (spec.md §8 scenario 3)
        let fmt = DFFormat::new(100, 7, "GPL".into(), "L", "Lat").unwrap();
        let payload = 473977000i32.to_le_bytes();
        let values = decode(&fmt, &payload).unwrap();
        let Value::I32(raw) = values[0] else { panic!() };
        assert_eq!(raw, 473977000);
        let scaled = raw as f64 / FormatChar::LatLon.divisor().unwrap();
        assert!((scaled - 47.3977).abs() < 1e-9);
    }

    #[test]
    fn round_trip_basic_record() {
        let fmt = DFFormat::new(10, 3 + 1 + 2, "XYZ".into(), "bh", "A,B").unwrap();
        let values = vec![Value::I8(-5), Value::I16(1234)];
        let bytes = encode(&fmt, &values);
        let decoded = decode(&fmt, &bytes[3..]).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn encode_prefers_mode_num_over_mode() {
        let fmt = DFFormat::new(60, 3 + 1 + 1, "MODE".into(), "MB", "Mode,ModeNum").unwrap();
        // Mode column carries a stale/symbolic value; ModeNum is authoritative.
        let values = vec![Value::I8(9), Value::U8(3)];
        let bytes = encode(&fmt, &values);
        let decoded = decode(&fmt, &bytes[3..]).unwrap();
        assert_eq!(decoded[0], Value::I8(3));
        assert_eq!(decoded[1], Value::U8(3));
    }

    #[test]
    fn string_field_truncates_at_nul() {
        let fmt = DFFormat::new(20, 3 + 4, "NAM".into(), "n", "Name").unwrap();
        let mut payload = [0u8; 4];
        payload[..3].copy_from_slice(b"ab\0");
        let decoded = decode(&fmt, &payload).unwrap();
        assert_eq!(decoded[0], Value::Str(b"ab".to_vec()));
    }
}
