//! Component A (part 1): the wire format character table and the
//! per-message-type schema record (`DFFormat`) it builds up into.
//!
//! Grounded on `fit-rs`'s `DefinitionMessage`/`DefinitionField`
//! (`fit/definition_message.rs`): there, a FIT "definition message"
//! declares a global id plus an ordered list of `(field_def_no, size,
//! base_type)` triples that every later data message of that id is
//! unpacked against. `FMT` here plays the identical role, except the
//! field types come from single ASCII characters instead of FIT base
//! type bytes (see `basetypes.rs` in the same crate for the source
//! pattern this table is adapted from).

use std::collections::HashMap;

use crate::error::DfError;

/// One wire format character, with its on-the-wire size and scalar
/// behavior. Division is preferred over multiplication for the
/// centi-scaled and lat/lon variants per spec.md §4.B, since the
/// reciprocal (100, 1e7) is exactly representable and dividing avoids a
/// lossy multiply by 0.01 or 1e-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChar {
    Array16,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Float16,
    Str4,
    Str16,
    Str64,
    CentiInt16,
    CentiUInt16,
    CentiInt32,
    CentiUInt32,
    LatLon,
    ModeEnum,
}

impl FormatChar {
    pub fn from_char(c: char) -> Option<Self> {
        use FormatChar::*;
        Some(match c {
            'a' => Array16,
            'b' => Int8,
            'B' => UInt8,
            'h' => Int16,
            'H' => UInt16,
            'i' => Int32,
            'I' => UInt32,
            'q' => Int64,
            'Q' => UInt64,
            'f' => Float32,
            'd' => Float64,
            'g' => Float16,
            'n' => Str4,
            'N' => Str16,
            'Z' => Str64,
            'c' => CentiInt16,
            'C' => CentiUInt16,
            'e' => CentiInt32,
            'E' => CentiUInt32,
            'L' => LatLon,
            'M' => ModeEnum,
            _ => return None,
        })
    }

    /// On-wire byte width of a single value of this type.
    pub fn wire_size(self) -> usize {
        use FormatChar::*;
        match self {
            Array16 => 32, // 16 * i16
            Int8 | UInt8 | ModeEnum => 1,
            Int16 | UInt16 | CentiInt16 | CentiUInt16 | Float16 => 2,
            Int32 | UInt32 | Float32 | CentiInt32 | CentiUInt32 | LatLon => 4,
            Int64 | UInt64 | Float64 => 8,
            Str4 => 4,
            Str16 => 16,
            Str64 => 64,
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, FormatChar::Str4 | FormatChar::Str16 | FormatChar::Str64)
    }

    /// Built-in scalar divisor, spec.md §4.B format character table.
    pub fn divisor(self) -> Option<f64> {
        use FormatChar::*;
        match self {
            CentiInt16 | CentiUInt16 | CentiInt32 | CentiUInt32 => Some(100.0),
            LatLon => Some(1e7),
            _ => None,
        }
    }
}

/// Which column disambiguates multiple concurrent instances of a single
/// message type (spec.md §3, §4.A: "instance_field").
#[derive(Debug, Clone)]
pub struct InstanceField {
    pub name: String,
    /// Byte offset of this field within the payload (after the 3-byte header).
    pub offset: usize,
    pub len: usize,
}

/// A single message type's schema, bootstrapped from a `FMT` record and
/// decorated in place by later `FMTU`/`UNIT`/`MULT` records.
#[derive(Debug, Clone)]
pub struct DFFormat {
    pub type_id: u8,
    pub name: String,
    pub record_length: usize,
    pub format_spec: Vec<FormatChar>,
    pub columns: Vec<String>,
    pub column_index: HashMap<String, usize>,
    pub array_field_positions: Vec<usize>,
    /// Per-column unit label, empty string if none.
    pub units: Vec<String>,
    /// Per-column multiplier override from `MULT`/`FMTU`, if any.
    pub msg_mults: Vec<Option<f64>>,
    pub instance_field: Option<InstanceField>,
    /// Byte offset of each column within the payload (after the 3-byte header).
    pub field_offsets: Vec<usize>,
}

/// The bootstrap `FMT` type id and its hardcoded self-describing shape
/// (spec.md §3 invariants, §6).
pub const FMT_TYPE_ID: u8 = 0x80;
pub const FMT_RECORD_LENGTH: usize = 89;
pub const FMT_FORMAT_SPEC: &str = "BBnNZ";
pub const FMT_COLUMNS: &str = "Type,Length,Name,Format,Columns";

impl DFFormat {
    /// Build a `DFFormat` from a decoded `FMT` record's own fields:
    /// `(type, length, name, format, columns)`.
    pub fn new(
        type_id: u8,
        record_length: usize,
        name: String,
        format: &str,
        columns_csv: &str,
    ) -> Result<Self, DfError> {
        let columns: Vec<String> = if columns_csv.is_empty() {
            Vec::new()
        } else {
            columns_csv.split(',').map(|s| s.trim().to_string()).collect()
        };

        let mut format_spec = Vec::with_capacity(format.len());
        for c in format.chars() {
            match FormatChar::from_char(c) {
                Some(fc) => format_spec.push(fc),
                None => return Err(DfError::UnsupportedFormatChar(c, type_id)),
            }
        }

        // Column list length must track format_spec length (spec.md §3).
        // Some logs under-specify trailing columns; pad with positional names.
        let mut columns = columns;
        while columns.len() < format_spec.len() {
            columns.push(format!("col{}", columns.len()));
        }
        columns.truncate(format_spec.len());

        let mut column_index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            column_index.insert(col.clone(), i);
        }

        let mut array_field_positions = Vec::new();
        let mut field_offsets = Vec::with_capacity(format_spec.len());
        let mut offset = 0usize;
        for (i, fc) in format_spec.iter().enumerate() {
            field_offsets.push(offset);
            if *fc == FormatChar::Array16 {
                array_field_positions.push(i);
            }
            offset += fc.wire_size();
        }

        let units = vec![String::new(); columns.len()];
        let msg_mults = vec![None; columns.len()];

        Ok(DFFormat {
            type_id,
            name,
            record_length,
            format_spec,
            columns,
            column_index,
            array_field_positions,
            units,
            msg_mults,
            instance_field: None,
            field_offsets,
        })
    }

    pub fn bootstrap() -> Self {
        Self::new(
            FMT_TYPE_ID,
            FMT_RECORD_LENGTH,
            "FMT".to_string(),
            FMT_FORMAT_SPEC,
            FMT_COLUMNS,
        )
        .expect("bootstrap FMT is well-formed")
    }

    pub fn payload_len(&self) -> usize {
        self.record_length.saturating_sub(3)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }
}
