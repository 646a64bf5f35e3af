//! Decoded field storage.
//!
//! Adapted from `fit-rs`'s `structs::BaseType` (`structs.rs`): one
//! variant per wire type, each carrying the already-endian-corrected
//! Rust value. Strings there are decoded eagerly; DataFlash needs a
//! Latin-1 fallback (spec.md §9 "UTF-8 with fallback to Latin-1 is a
//! read-side concern"), so only the raw null-terminated bytes are kept
//! here and decoding happens at `Value::as_str`.

use std::fmt;

/// One decoded field value. Numeric variants are always the *raw*
/// on-wire value; scalar multipliers are applied by the caller
/// (`Message::get_field`), never baked in here (design note: "store
/// raw decoded values; apply scaling on read").
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Array16([i16; 16]),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Null-terminated text field, raw bytes (post-truncation at first NUL).
    Str(Vec<u8>),
    /// Opaque bytes, used for `FILE.Z` (spec.md §4.B: "preserved as raw bytes").
    Bytes(Vec<u8>),
}

impl Value {
    /// Numeric value as `f64`, for scaling and arithmetic. `None` for
    /// string/byte variants.
    pub fn as_f64(&self) -> Option<f64> {
        use Value::*;
        Some(match self {
            I8(v) => *v as f64,
            U8(v) => *v as f64,
            I16(v) => *v as f64,
            U16(v) => *v as f64,
            I32(v) => *v as f64,
            U32(v) => *v as f64,
            I64(v) => *v as f64,
            U64(v) => *v as f64,
            F32(v) => *v as f64,
            F64(v) => *v,
            Array16(_) | Str(_) | Bytes(_) => return None,
        })
    }

    /// UTF-8 with fallback to ISO-8859-1 (Latin-1 maps byte-for-byte
    /// onto the first 256 Unicode scalars, so this decode never fails).
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Str(bytes) => Some(match std::str::from_utf8(bytes) {
                Ok(s) => s.to_string(),
                Err(_) => bytes.iter().map(|&b| b as char).collect(),
            }),
            _ => None,
        }
    }

    pub fn is_nan_float(&self) -> bool {
        matches!(self, Value::F32(v) if v.is_nan()) || matches!(self, Value::F64(v) if v.is_nan())
    }

    /// Quiet-NaN classification (spec.md §4.B): a float NaN whose IEEE-754
    /// bit pattern differs from the canonical signalling pattern
    /// `7FF8000000000000` (promoted to f64 for the comparison).
    pub fn is_quiet_nan(&self) -> bool {
        let bits: u64 = match self {
            Value::F64(v) if v.is_nan() => v.to_bits(),
            Value::F32(v) if v.is_nan() => (*v as f64).to_bits(),
            _ => return false,
        };
        bits != 0x7FF8_0000_0000_0000
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Array16(a) => write!(f, "{:?}", a),
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(_) if self.is_quiet_nan() => write!(f, "qnan"),
            Value::F64(_) if self.is_quiet_nan() => write!(f, "qnan"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(_) => write!(f, "{}", self.as_str().unwrap_or_default()),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Half-precision (`g`, IEEE 754 binary16) to `f32`. No external crate
/// carries this for the corpus's stack, so it is hand-rolled the way
/// `fit-rs` hand-rolls its base type unpacking in `basetypes.rs`/`lib.rs`.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) & 0x1) as u32;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let fraction = (bits & 0x3ff) as u32;

    if exponent == 0 {
        if fraction == 0 {
            return f32::from_bits(sign << 31);
        }
        // subnormal half -> normalized f32
        let mut e = -1i32;
        let mut frac = fraction;
        loop {
            e += 1;
            frac <<= 1;
            if frac & 0x400 != 0 {
                break;
            }
        }
        let frac = frac & 0x3ff;
        let exp_f32 = (127 - 15 - e) as u32;
        return f32::from_bits((sign << 31) | (exp_f32 << 23) | (frac << 13));
    }
    if exponent == 0x1f {
        let exp_f32 = 0xffu32;
        return f32::from_bits((sign << 31) | (exp_f32 << 23) | (fraction << 13));
    }
    let exp_f32 = exponent + (127 - 15);
    f32::from_bits((sign << 31) | (exp_f32 << 23) | (fraction << 13))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_nan_classification() {
        let canonical = f64::from_bits(0x7FF8_0000_0000_0000);
        assert!(!Value::F64(canonical).is_quiet_nan());
        let other_nan = f64::from_bits(0x7FF8_0000_0000_0001);
        assert!(Value::F64(other_nan).is_quiet_nan());
    }

    #[test]
    fn f16_roundtrip_simple_values() {
        assert_eq!(f16_to_f32(0x3C00), 1.0); // 1.0 in binary16
        assert_eq!(f16_to_f32(0xBC00), -1.0);
        assert_eq!(f16_to_f32(0x0000), 0.0);
    }
}
