//! Component D: the first-pass scan. Builds per-type offset lists and
//! counts, and decodes schema/unit/mult records and a seed message per
//! type inline, so random access and live state are ready before the
//! reader serves its first `recv_msg`.
//!
//! Grounded on `fit-rs`'s `Fit::read` (`fit/fit.rs`), which walks the
//! whole file once, registering `DefinitionMessage`s as it meets them
//! and decoding every `DataMessage` inline — same single-pass shape,
//! generalized here to *selectively* decode (full decode of every
//! record up front would defeat the point of lazy `recv_msg`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::format::DFFormat;
use crate::framing::{next_frame, Frame, FramingState};
use crate::message::Message;
use crate::registry::FormatRegistry;
use crate::value::Value;

pub const ENV_NATIVE_INDEXER: &str = "DFLOG_NATIVE_INDEXER";

/// Per-type-id offset lists and record counts built by one indexing pass.
#[derive(Debug, Clone)]
pub struct Index {
    pub offsets: Vec<Vec<usize>>,
    pub counts: Vec<usize>,
}

impl Index {
    fn new() -> Self {
        Index {
            offsets: vec![Vec::new(); 256],
            counts: vec![0usize; 256],
        }
    }

    /// Build a counts-only `Index` for the text dialect (spec.md §4.G):
    /// offsets are line numbers rather than byte positions, so only the
    /// per-type-id record count (used by `Reader::open`'s schema check)
    /// is populated here; `last_timestamp` uses the text backend's own
    /// `TextIndex` for line lookups instead of this struct.
    pub(crate) fn from_text(text_index: &crate::text::TextIndex, registry_hint: &FormatRegistry) -> Self {
        let mut index = Index::new();
        for (name, offs) in &text_index.offsets_by_type {
            if let Some(fmt) = registry_hint.get_by_name(name) {
                index.counts[fmt.type_id as usize] = offs.len();
            }
        }
        index
    }
}

/// Live per-type (and per-`type[instance]`) last-seen snapshot seeded
/// during indexing. The reader façade keeps updating this same map on
/// every subsequent `recv_msg`.
pub type LiveMessages = HashMap<String, Message>;

/// Run the first-pass scan described in spec.md §4.D. `native_indexer`
/// mirrors `ReaderOptions.native_indexer`/the `DFLOG_NATIVE_INDEXER` env
/// var; since no accelerator is linked in, requesting one only changes
/// whether a warning is logged — semantics are otherwise identical.
pub fn build_index(
    data: &[u8],
    registry: &mut FormatRegistry,
    messages: &mut LiveMessages,
    native_indexer: bool,
    mut progress: impl FnMut(u8),
) -> Index {
    if native_indexer {
        tracing::warn!("native indexer requested but not linked in; using the portable indexer");
    }

    let mut index = Index::new();
    let mut seeded_types: HashSet<u8> = HashSet::new();
    let mut seen_instances: HashMap<u8, HashSet<Vec<u8>>> = HashMap::new();

    let mut pos = 0usize;
    let mut state = FramingState::default();
    let mut last_percent: u8 = 0;
    let len = data.len().max(1);

    loop {
        match next_frame(data, &mut pos, registry, &mut state) {
            Frame::Eof => break,
            Frame::Record { offset, type_id, payload } => {
                index.offsets[type_id as usize].push(offset);
                index.counts[type_id as usize] += 1;

                let Some(fmt) = registry.get(type_id).cloned() else {
                    continue;
                };

                match fmt.name.as_str() {
                    "FMT" | "FMTU" | "UNIT" | "MULT" => {
                        if let Ok(values) = crate::codec::decode(&fmt, payload) {
                            apply_schema_record(&fmt, &values, registry);
                        }
                    }
                    _ => seed_live_state(
                        &fmt,
                        type_id,
                        payload,
                        index.counts[type_id as usize],
                        &mut seeded_types,
                        &mut seen_instances,
                        messages,
                    ),
                }

                let percent = ((offset as u64 * 100) / len as u64) as u8;
                if percent > last_percent {
                    last_percent = percent;
                    progress(percent);
                }
            }
        }
    }

    index
}

/// Apply a decoded `FMT`/`FMTU`/`UNIT`/`MULT` record's effect on
/// `registry`. `fmt` is the schema type's own format (used only to
/// build a `Message` for named-field lookup over `values`); `values`
/// must already have been decoded against it. Shared by the indexer
/// and by `Reader::recv_msg`, which also returns schema records to
/// callers like any other message.
pub fn apply_schema_record(fmt: &DFFormat, values: &[Value], registry: &mut FormatRegistry) {
    match fmt.name.as_str() {
        "FMT" => apply_fmt_values(values, registry),
        "FMTU" => apply_fmtu_values(values, registry),
        "UNIT" => apply_unit_values(values, registry),
        "MULT" => apply_mult_values(values, registry),
        _ => {}
    }
}

pub fn apply_fmt_values(values: &[Value], registry: &mut FormatRegistry) {
    let fmt = DFFormat::bootstrap();
    let msg = Message::new(Arc::new(fmt), values.to_vec());
    let (Some(new_type), Some(new_len), Some(name), Some(format_str), Some(columns)) = (
        msg.get_field("Type"),
        msg.get_field("Length"),
        msg.get_str("Name"),
        msg.get_str("Format"),
        msg.get_str("Columns"),
    ) else {
        return;
    };
    let name = name.trim_end_matches('\0').to_string();
    match DFFormat::new(new_type as u8, new_len as usize, name, &format_str, &columns) {
        Ok(new_fmt) => registry.insert(new_fmt),
        Err(err) => tracing::error!(?err, "unsupported format character in FMT record"),
    }
}

pub fn apply_fmtu_values(values: &[Value], registry: &mut FormatRegistry) {
    let Some(fmt) = registry.get_by_name("FMTU").cloned() else { return };
    let msg = Message::new(Arc::new(fmt), values.to_vec());
    let Some(target_type) = msg.get_field("FmtType") else { return };
    let unit_ids = msg.get_str("UnitIds").unwrap_or_default();
    let mult_ids = msg.get_str("MultIds").unwrap_or_default();
    registry.set_units(target_type as u8, &unit_ids);
    registry.set_multipliers(target_type as u8, &mult_ids);
}

pub fn apply_unit_values(values: &[Value], registry: &mut FormatRegistry) {
    let Some(fmt) = registry.get_by_name("UNIT").cloned() else { return };
    let msg = Message::new(Arc::new(fmt), values.to_vec());
    let Some(id) = msg.get_field("Id") else { return };
    let Some(label) = msg.get_str("Label") else { return };
    registry.record_unit(id as u8 as char, label.trim_end_matches('\0').to_string());
}

pub fn apply_mult_values(values: &[Value], registry: &mut FormatRegistry) {
    let Some(fmt) = registry.get_by_name("MULT").cloned() else { return };
    let msg = Message::new(Arc::new(fmt), values.to_vec());
    let Some(id) = msg.get_field("Id") else { return };
    let Some(mult) = msg.get_field("Mult") else { return };
    registry.record_mult(id as u8 as char, mult);
}

/// Seed `messages[type]`/`messages["type[instance]"]` for non-schema
/// types, per spec.md §4.D's discovery rules.
fn seed_live_state(
    fmt: &DFFormat,
    type_id: u8,
    payload: &[u8],
    records_seen: usize,
    seeded_types: &mut HashSet<u8>,
    seen_instances: &mut HashMap<u8, HashSet<Vec<u8>>>,
    messages: &mut LiveMessages,
) {
    let Some(instance) = &fmt.instance_field else {
        if seeded_types.insert(type_id) {
            if let Ok(values) = crate::codec::decode(fmt, payload) {
                messages.insert(fmt.name.clone(), Message::new(Arc::new(fmt.clone()), values));
            }
        }
        return;
    };

    if instance.len == 1 && records_seen > 100 {
        return;
    }
    let Some(raw) = payload.get(instance.offset..instance.offset + instance.len) else { return };
    let seen = seen_instances.entry(type_id).or_default();
    if !seen.insert(raw.to_vec()) {
        return;
    }
    let Ok(values) = crate::codec::decode(fmt, payload) else { return };
    let msg = Message::new(Arc::new(fmt.clone()), values);
    if let Some(inst_val) = msg.get_field(&instance.name) {
        let key = format!("{}[{}]", fmt.name, inst_val as i64);
        messages.insert(key, msg.clone());
    }
    messages.entry(fmt.name.clone()).or_insert(msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::format::FMT_TYPE_ID;
    use crate::value::Value;

    fn bootstrap_bytes() -> Vec<u8> {
        let fmt = DFFormat::bootstrap();
        let values = vec![
            Value::U8(10),
            Value::U8(3 + 1 + 2),
            Value::Str(b"XYZ".to_vec()),
            Value::Str(b"bh".to_vec()),
            Value::Str(b"A,B".to_vec()),
        ];
        encode(&fmt, &values)
    }

    #[test]
    fn indexes_bootstrap_and_defines_new_type() {
        let mut registry = FormatRegistry::new();
        let mut messages = LiveMessages::new();
        let data = bootstrap_bytes();
        let idx = build_index(&data, &mut registry, &mut messages, false, |_| {});
        assert_eq!(idx.counts[FMT_TYPE_ID as usize], 1);
        assert!(registry.get_by_name("XYZ").is_some());
    }
}
