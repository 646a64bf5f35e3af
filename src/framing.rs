//! Component C: locate `0xA3 0x95 <type>` framed records in the byte
//! stream, resyncing past corruption.
//!
//! Grounded on `fit-rs`'s `Fit::next` cursor walk over its mmap'd byte
//! slice (`fit/fit.rs`), which advances a plain `usize` position rather
//! than a `Read`er, since the whole file is already resident. DataFlash
//! adds a resync loop `fit-rs` doesn't need, because FIT records are
//! never corrupted by flash wraparound the way APM2 DataFlash logs are.

use crate::registry::FormatRegistry;

pub const MAGIC: [u8; 2] = [0xA3, 0x95];

/// Trailing-garbage tolerance window for APM2 flash-based logs (spec.md
/// §4.C): minimum block-residue is 249 bytes, 528 is a safe bound above
/// it. A gap of unresolved bytes within this many bytes of EOF is
/// treated as harmless flash padding, not corruption.
pub const TRAILING_TOLERANCE: usize = 528;

#[derive(Debug)]
pub enum Frame<'a> {
    /// A fully framed, in-bounds record. `payload` is the
    /// `record_length - 3` bytes following the header.
    Record {
        offset: usize,
        type_id: u8,
        payload: &'a [u8],
    },
    Eof,
}

/// State threaded across calls to `next_frame` so corruption diagnostics
/// can name the previously-decoded type (spec.md §4.C: "diagnostic
/// naming skipped count, start offset, bad triple, and previous good
/// type").
#[derive(Debug, Default)]
pub struct FramingState {
    pub last_good_type: Option<u8>,
}

/// Advance `pos` to the next record, resyncing on corruption. Returns
/// `Frame::Eof` when no further record can be framed: insufficient
/// bytes for the magic, an unknown type id (no prior `FMT`), or a
/// declared record length that runs past the end of `data`.
pub fn next_frame<'a>(
    data: &'a [u8],
    pos: &mut usize,
    registry: &FormatRegistry,
    state: &mut FramingState,
) -> Frame<'a> {
    loop {
        if *pos + 3 > data.len() {
            return Frame::Eof;
        }
        if data[*pos] == MAGIC[0] && data[*pos + 1] == MAGIC[1] {
            let type_id = data[*pos + 2];
            let Some(fmt) = registry.get(type_id) else {
                let remaining = data.len() - *pos;
                if remaining > TRAILING_TOLERANCE {
                    tracing::warn!(
                        offset = *pos,
                        type_id,
                        previous_good_type = ?state.last_good_type,
                        "unknown type id at offset, not preceded by a FMT; stopping"
                    );
                }
                return Frame::Eof;
            };
            let record_len = fmt.record_length;
            if *pos + record_len > data.len() {
                return Frame::Eof;
            }
            let payload = &data[*pos + 3..*pos + record_len];
            let offset = *pos;
            *pos += record_len;
            state.last_good_type = Some(type_id);
            return Frame::Record {
                offset,
                type_id,
                payload,
            };
        }

        let skip_start = *pos;
        while *pos + 2 <= data.len() && !(data[*pos] == MAGIC[0] && data[*pos + 1] == MAGIC[1]) {
            *pos += 1;
        }
        if *pos + 2 > data.len() {
            return Frame::Eof;
        }
        let skipped = *pos - skip_start;
        let remaining = data.len() - *pos;
        if remaining > TRAILING_TOLERANCE {
            let bad_triple = [
                data.get(skip_start).copied().unwrap_or(0),
                data.get(skip_start + 1).copied().unwrap_or(0),
                data.get(skip_start + 2).copied().unwrap_or(0),
            ];
            tracing::warn!(
                skipped,
                start_offset = skip_start,
                bad_triple = ?bad_triple,
                previous_good_type = ?state.last_good_type,
                "resynced after corrupt bytes"
            );
        }
        // loop back around: magic now sits at *pos, decoded on the next iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DFFormat;

    fn registry_with_xyz() -> FormatRegistry {
        let mut reg = FormatRegistry::new();
        reg.insert(DFFormat::new(10, 3 + 1 + 2, "XYZ".into(), "bh", "A,B").unwrap());
        reg
    }

    #[test]
    fn frames_single_record() {
        let reg = registry_with_xyz();
        let mut data = vec![0xA3, 0x95, 10];
        data.extend_from_slice(&(-5i8).to_le_bytes());
        data.extend_from_slice(&1234i16.to_le_bytes());
        let mut pos = 0;
        let mut state = FramingState::default();
        match next_frame(&data, &mut pos, &reg, &mut state) {
            Frame::Record { offset, type_id, payload } => {
                assert_eq!(offset, 0);
                assert_eq!(type_id, 10);
                assert_eq!(payload.len(), 3);
            }
            Frame::Eof => panic!("expected a record"),
        }
        assert_eq!(pos, data.len());
        assert!(matches!(next_frame(&data, &mut pos, &reg, &mut state), Frame::Eof));
    }

    #[test]
    fn resync_skips_garbage_and_preserves_value() {
        let reg = registry_with_xyz();
        let mut data = vec![0u8; 10]; // garbage
        let record_start = data.len();
        data.push(0xA3);
        data.push(0x95);
        data.push(10);
        data.extend_from_slice(&(-5i8).to_le_bytes());
        data.extend_from_slice(&1234i16.to_le_bytes());
        let mut pos = 0;
        let mut state = FramingState::default();
        match next_frame(&data, &mut pos, &reg, &mut state) {
            Frame::Record { offset, payload, .. } => {
                assert_eq!(offset, record_start);
                assert_eq!(payload, &[(-5i8) as u8, 0xD2, 0x04][..]);
            }
            Frame::Eof => panic!("expected resync to find the record"),
        }
    }

    #[test]
    fn short_trailing_record_is_eof() {
        let reg = registry_with_xyz();
        let data = vec![0xA3, 0x95, 10, 1]; // declares 6-byte record, only 1 payload byte present
        let mut pos = 0;
        let mut state = FramingState::default();
        assert!(matches!(next_frame(&data, &mut pos, &reg, &mut state), Frame::Eof));
    }
}
