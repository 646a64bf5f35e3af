//! The decoded record type handed to callers, and its scaled-field
//! accessor.
//!
//! Grounded on `fit-rs`'s `DataMessage`/`DataField` pair
//! (`fit/data_message.rs`, `fit/data_field.rs`): a message is a thin
//! wrapper around its format plus an ordered value list, with
//! `Display` impls that print `name: value` pairs. The scale/offset
//! bookkeeping `fit-rs` keeps in `DataFieldAttributes` is, here,
//! already on `DFFormat` (units/msg_mults per column) since DataFlash
//! decorates formats in place rather than per-field.

use std::fmt;
use std::sync::Arc;

use crate::format::DFFormat;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Message {
    pub format: Arc<DFFormat>,
    pub values: Vec<Value>,
    /// Whether `get_field` applies the column's scalar multiplier.
    /// Always `true` for normal reads; callers decoding raw telemetry
    /// for re-encoding can flip it off.
    pub apply_multiplier: bool,
    /// Absolute UTC time in seconds since Unix epoch, assigned by the
    /// clock subsystem (component E). `0.0` until stamped.
    pub timestamp: f64,
}

impl Message {
    pub fn new(format: Arc<DFFormat>, values: Vec<Value>) -> Self {
        Message {
            format,
            values,
            apply_multiplier: true,
            timestamp: 0.0,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.format.name
    }

    pub fn type_id(&self) -> u8 {
        self.format.type_id
    }

    pub fn raw(&self, name: &str) -> Option<&Value> {
        let idx = self.format.field_index(name)?;
        self.values.get(idx)
    }

    pub fn raw_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// First field's name, used by the clock subsystem to detect
    /// `TimeUS`/`TimeMS`-leading messages (spec.md §4.E).
    pub fn first_field_name(&self) -> Option<&str> {
        self.format.columns.first().map(|s| s.as_str())
    }

    /// Scaled field value as `f64`. Applies the column's built-in
    /// divisor (c/C/e/E/L) or `FMTU` multiplier override when
    /// `apply_multiplier` is set, preferring division over
    /// multiplication for accuracy (spec.md §4.B).
    pub fn get_field(&self, name: &str) -> Option<f64> {
        let idx = self.format.field_index(name)?;
        let value = self.values.get(idx)?;
        let raw = value.as_f64()?;
        if !self.apply_multiplier {
            return Some(raw);
        }
        let divisor = self.format.format_spec.get(idx).and_then(|fc| fc.divisor());
        if let Some(d) = divisor {
            return Some(raw / d);
        }
        if let Some(mult) = self.format.msg_mults.get(idx).copied().flatten() {
            return Some(raw * mult);
        }
        Some(raw)
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.raw(name)?.as_str()
    }

    /// Set a field from a scaled (human-readable) value, reversing the
    /// scaling applied by `get_field` by multiplying by the divisor and
    /// rounding to the nearest integer before storing (spec.md §4.B:
    /// "For fields with multipliers, divide and round-to-nearest integer
    /// before packing").
    pub fn set_field_scaled(&mut self, name: &str, scaled: f64) -> bool {
        let Some(idx) = self.format.field_index(name) else { return false };
        let divisor = self.format.format_spec.get(idx).and_then(|fc| fc.divisor());
        let raw = match divisor {
            Some(d) => (scaled * d).round(),
            None => scaled,
        };
        let Some(slot) = self.values.get_mut(idx) else { return false };
        *slot = match slot {
            Value::I8(_) => Value::I8(raw as i8),
            Value::U8(_) => Value::U8(raw as u8),
            Value::I16(_) => Value::I16(raw as i16),
            Value::U16(_) => Value::U16(raw as u16),
            Value::I32(_) => Value::I32(raw as i32),
            Value::U32(_) => Value::U32(raw as u32),
            Value::I64(_) => Value::I64(raw as i64),
            Value::U64(_) => Value::U64(raw as u64),
            Value::F32(_) => Value::F32(raw as f32),
            Value::F64(_) => Value::F64(raw),
            other => return {
                let _ = other;
                false
            },
        };
        true
    }

    pub fn encode(&self) -> Vec<u8> {
        crate::codec::encode(&self.format, &self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DFFormat;

    #[test]
    fn scaled_field_round_trips_through_set_field_scaled() {
        let fmt = Arc::new(DFFormat::new(40, 3 + 4, "ALT".into(), "e", "Alt").unwrap());
        let mut msg = Message::new(fmt, vec![Value::I32(0)]);
        msg.set_field_scaled("Alt", 12.34);
        let scaled = msg.get_field("Alt").unwrap();
        assert!((scaled - 12.34).abs() < 1e-6);
    }

    #[test]
    fn display_shows_qnan() {
        let fmt = Arc::new(DFFormat::new(41, 3 + 4, "SNS".into(), "f", "Val").unwrap());
        let bits = 0x7FC0_0000u32; // f32 NaN, not the canonical signalling pattern
        let msg = Message::new(fmt, vec![Value::F32(f32::from_bits(bits))]);
        let text = format!("{msg}");
        assert!(text.contains("qnan"));
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.format.name)?;
        for (i, col) in self.format.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.get_field(col) {
                Some(v) => write!(f, "{col}: {v}")?,
                None => match self.values.get(i) {
                    Some(v) => write!(f, "{col}: {v}")?,
                    None => write!(f, "{col}: ?")?,
                },
            }
        }
        write!(f, "}}")
    }
}
