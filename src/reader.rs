//! Component F: the public reader façade. Owns the memory map, the
//! format registry, the index, the clock, and the live `messages`
//! snapshot, and drives the other components to serve `recv_msg` et al.
//!
//! Grounded on `fit-rs`'s top-level `Fit` struct (`fit/fit.rs`), which
//! likewise owns an mmap, a definition registry, and a cursor, exposing
//! an iterator-like `next()` over decoded messages. The live
//! last-seen-per-type map and flight-mode/parameter bookkeeping here
//! have no `fit-rs` analogue; those are grounded directly on spec.md
//! §4.F, kept in the same terse, explicit-match style as the rest of
//! this crate's component modules.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::clock::{select_clock, Clock};
use crate::codec;
use crate::error::{DfError, DfResult};
use crate::format::DFFormat;
use crate::framing::{next_frame, Frame, FramingState};
use crate::index::{build_index, Index, LiveMessages};
use crate::message::Message;
use crate::registry::FormatRegistry;
use crate::text::{self, Delimiter, TextIndex};

/// Open-time configuration (spec.md §5/§4.D/§4.E's optional knobs).
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Skip GPS-based timebase discovery; timestamps become deltas from
    /// zero (spec.md §4.E).
    pub zero_time_base: bool,
    /// Request the native indexer accelerator. Falls back to the
    /// portable indexer with a warning if unavailable (spec.md §4.D/§6).
    pub native_indexer: bool,
    /// When set, `skip_to_type`/`recv_match` do not implicitly widen the
    /// type set with `{MODE,MSG,PARM,STAT,ORGN,VER}` (spec.md §4.F).
    pub strict: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            zero_time_base: false,
            native_indexer: std::env::var(crate::index::ENV_NATIVE_INDEXER)
                .map(|v| v == "on" || v == "1" || v == "true")
                .unwrap_or(false),
            strict: false,
        }
    }
}

/// Types implicitly added to `skip_to_type`/`recv_match`'s set when not
/// `strict`, so live vehicle state stays coherent while filtering.
const AUGMENT_TYPES: &[&str] = &["MODE", "MSG", "PARM", "STAT", "ORGN", "VER"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleType {
    Rover,
    FixedWing,
    Quadrotor,
    AntennaTracker,
    Submarine,
    Airship,
    Heli,
}

/// Per-dialect cursor state (spec.md §4.G: the text variant reuses
/// A/B/E/F with a line-oriented framer instead of the magic-byte one).
enum Backend {
    Binary { pos: usize, framing_state: FramingState },
    Text { lines: Vec<String>, delim: Delimiter, index: TextIndex, line_pos: usize },
}

pub struct Reader {
    data: Mmap,
    pub registry: FormatRegistry,
    index: Index,
    pub messages: LiveMessages,
    clock: Clock,
    backend: Backend,
    opts: ReaderOptions,

    pub mav_type: Option<VehicleType>,
    pub mode: Option<String>,
    pub params: HashMap<String, f64>,
    pub param_defaults: HashMap<String, f64>,
    flightmode_cache: Option<Vec<(String, f64, f64)>>,
}

impl Reader {
    /// Open `path`, build the index, run clock selection, and rewind
    /// the cursor to the start (spec.md §4.F `open`). Dialect is
    /// auto-detected per spec.md §4.G (first 8000 bytes contain `FMT,`).
    pub fn open(path: impl AsRef<Path>, opts: ReaderOptions) -> DfResult<Self> {
        let file = File::open(path)?;
        let data = unsafe { Mmap::map(&file)? };
        if data.is_empty() {
            return Err(DfError::EmptyInput);
        }

        let mut registry = FormatRegistry::new();
        let mut messages = LiveMessages::new();

        let (index, backend) = if text::looks_like_text(&data) {
            let text_buf = String::from_utf8_lossy(&data).into_owned();
            let (lines, text_index) = text::index_text(&text_buf, &mut registry, &mut messages);
            let delim = text::detect_delimiter(&lines);
            let owned_lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
            let index = Index::from_text(&text_index, &registry);
            (
                index,
                Backend::Text { lines: owned_lines, delim, index: text_index, line_pos: 0 },
            )
        } else {
            let index = build_index(&data, &mut registry, &mut messages, opts.native_indexer, |pct| {
                tracing::trace!(percent = pct, "indexing");
            });
            (index, Backend::Binary { pos: 0, framing_state: FramingState::default() })
        };

        if index.counts[crate::format::FMT_TYPE_ID as usize] == 0 {
            return Err(DfError::NoSchema);
        }

        let clock = match &backend {
            Backend::Text { lines, delim, .. } => {
                crate::clock::select_clock_text(lines, *delim, &registry, opts.zero_time_base)
            }
            Backend::Binary { .. } => select_clock(&data, &registry, opts.zero_time_base),
        };

        let mut reader = Reader {
            data,
            registry,
            index,
            messages,
            clock,
            backend,
            opts,
            mav_type: None,
            mode: None,
            params: HashMap::new(),
            param_defaults: HashMap::new(),
            flightmode_cache: None,
        };
        reader.rewind();
        Ok(reader)
    }

    /// Reset cursor to start; clock rewind hooks run; indexes and schema
    /// registry are preserved (spec.md §4.F `rewind`).
    pub fn rewind(&mut self) {
        match &mut self.backend {
            Backend::Binary { pos, framing_state } => {
                *pos = 0;
                *framing_state = FramingState::default();
            }
            Backend::Text { line_pos, .. } => *line_pos = 0,
        }
        self.clock.rewind();
    }

    /// Decode the next framed record, stamp it, update live state, and
    /// advance the cursor. `None` at EOF (spec.md §4.F `recv_msg`).
    pub fn recv_msg(&mut self) -> Option<Message> {
        match &self.backend {
            Backend::Binary { .. } => self.recv_msg_binary(),
            Backend::Text { .. } => self.recv_msg_text(),
        }
    }

    fn recv_msg_binary(&mut self) -> Option<Message> {
        loop {
            let Backend::Binary { pos, framing_state } = &mut self.backend else { unreachable!() };
            match next_frame(&self.data, pos, &self.registry, framing_state) {
                Frame::Eof => return None,
                Frame::Record { type_id, payload, .. } => {
                    let Some(fmt) = self.registry.get(type_id).cloned() else { continue };
                    let values = match codec::decode(&fmt, payload) {
                        Ok(v) => v,
                        Err(err) => {
                            tracing::warn!(?err, type_id, "decode failure, skipping record");
                            continue;
                        }
                    };
                    // Schema records are still returned to the caller like
                    // any other message; the registry is updated first so
                    // later lookups (not this one) see the new definition.
                    crate::index::apply_schema_record(&fmt, &values, &mut self.registry);
                    let mut msg = Message::new(std::sync::Arc::new(fmt), values);
                    self.clock.set_message_timestamp(&mut msg);
                    self.update_live_state(&msg);
                    return Some(msg);
                }
            }
        }
    }

    fn recv_msg_text(&mut self) -> Option<Message> {
        loop {
            let Backend::Text { lines, delim, line_pos, .. } = &mut self.backend else { unreachable!() };
            if *line_pos >= lines.len() {
                return None;
            }
            let line = lines[*line_pos].clone();
            let delim = *delim;
            *line_pos += 1;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = delim.split(&line);
            if fields.len() == 5 && line.trim_end().ends_with(',') {
                fields.push("");
            }
            let Some(&name_field) = fields.first() else { continue };
            let name = name_field.trim();
            if name.is_empty() {
                continue;
            }

            match name {
                "FMT" | "FMTU" | "UNIT" | "MULT" => {
                    let Some(fmt) = self.registry.get_by_name(name).cloned() else { continue };
                    let values = crate::text::decode_text_fields(&fmt, &fields[1..]);
                    match name {
                        "FMT" => text::apply_text_fmt(&fields[1..], &mut self.registry),
                        "FMTU" => text::apply_text_fmtu(&fields[1..], &mut self.registry),
                        "UNIT" => text::apply_text_unit(&fields[1..], &mut self.registry),
                        "MULT" => text::apply_text_mult(&fields[1..], &mut self.registry),
                        _ => unreachable!(),
                    }
                    let mut msg = Message::new(std::sync::Arc::new(fmt), values);
                    msg.apply_multiplier = false;
                    self.clock.set_message_timestamp(&mut msg);
                    self.update_live_state(&msg);
                    return Some(msg);
                }
                _ => {
                    let Some(fmt) = self.registry.get_by_name(name).cloned() else { continue };
                    if fields.len() - 1 < fmt.format_spec.len() {
                        continue;
                    }
                    let values = crate::text::decode_text_fields(&fmt, &fields[1..]);
                    let mut msg = Message::new(std::sync::Arc::new(fmt), values);
                    msg.apply_multiplier = false;
                    self.clock.set_message_timestamp(&mut msg);
                    self.update_live_state(&msg);
                    return Some(msg);
                }
            }
        }
    }

    /// Skip to (and return) the next message whose type is in `types`
    /// and for which `condition` returns true (spec.md §4.F `recv_match`).
    pub fn recv_match(
        &mut self,
        types: Option<&[&str]>,
        mut condition: impl FnMut(&Reader, &Message) -> bool,
        strict: bool,
    ) -> Option<Message> {
        let augmented = self.augmented_type_set(types, strict);
        loop {
            let msg = self.recv_msg()?;
            if let Some(set) = &augmented {
                if !set.contains(msg.type_name()) {
                    continue;
                }
            }
            if condition(self, &msg) {
                return Some(msg);
            }
        }
    }

    /// Advance the cursor to the next record whose type is in `types`,
    /// without decoding it (spec.md §4.F `skip_to_type`).
    pub fn skip_to_type(&mut self, types: &[&str], strict: bool) -> Option<Message> {
        let augmented = self.augmented_type_set(Some(types), strict);
        loop {
            let msg = self.recv_msg()?;
            if let Some(set) = &augmented {
                if set.contains(msg.type_name()) {
                    return Some(msg);
                }
            } else {
                return Some(msg);
            }
        }
    }

    fn augmented_type_set(&self, types: Option<&[&str]>, strict: bool) -> Option<std::collections::HashSet<String>> {
        let types = types?;
        let mut set: std::collections::HashSet<String> = types.iter().map(|s| s.to_string()).collect();
        if !strict && !self.opts.strict {
            set.extend(AUGMENT_TYPES.iter().map(|s| s.to_string()));
        }
        Some(set)
    }

    /// Timestamp of the record at the highest byte offset (or, for the
    /// text dialect, the last line); falls back to the second-highest if
    /// that record fails to decode (spec.md §4.F `last_timestamp`).
    pub fn last_timestamp(&mut self) -> Option<f64> {
        match &self.backend {
            Backend::Binary { .. } => self.last_timestamp_binary(),
            Backend::Text { .. } => self.last_timestamp_text(),
        }
    }

    fn last_timestamp_binary(&mut self) -> Option<f64> {
        let mut candidates: Vec<(usize, u8)> = Vec::new();
        for type_id in 0..256u16 {
            if let Some(&last_off) = self.index.offsets[type_id as usize].last() {
                candidates.push((last_off, type_id as u8));
            }
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        for (offset, type_id) in candidates.into_iter().take(2) {
            if let Some(fmt) = self.registry.get(type_id) {
                let start = offset + 3;
                if let Some(payload) = self.data.get(start..start + fmt.payload_len()) {
                    if let Ok(values) = codec::decode(fmt, payload) {
                        let mut msg = Message::new(std::sync::Arc::new(fmt.clone()), values);
                        let mut clock = self.clock.clone();
                        clock.set_message_timestamp(&mut msg);
                        return Some(msg.timestamp);
                    }
                }
            }
        }
        None
    }

    fn last_timestamp_text(&mut self) -> Option<f64> {
        let Backend::Text { lines, delim, index, .. } = &self.backend else { unreachable!() };
        let mut candidates: Vec<(usize, String)> = Vec::new();
        for (name, offs) in &index.offsets_by_type {
            if let Some(&last) = offs.last() {
                candidates.push((last, name.clone()));
            }
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        for (line_no, name) in candidates.into_iter().take(2) {
            let Some(fmt) = self.registry.get_by_name(&name).cloned() else { continue };
            let Some(line) = lines.get(line_no) else { continue };
            let mut fields = delim.split(line);
            if fields.len() == 5 && line.trim_end().ends_with(',') {
                fields.push("");
            }
            if fields.len() - 1 < fmt.format_spec.len() {
                continue;
            }
            let values = crate::text::decode_text_fields(&fmt, &fields[1..]);
            let mut msg = Message::new(std::sync::Arc::new(fmt), values);
            msg.apply_multiplier = false;
            let mut clock = self.clock.clone();
            clock.set_message_timestamp(&mut msg);
            return Some(msg.timestamp);
        }
        None
    }

    /// Ordered `(mode, t_start, t_end)` triples covering the whole log,
    /// consecutive identical modes collapsed. Memoized; cursor is left
    /// rewound (spec.md §4.F `flightmode_list`).
    pub fn flightmode_list(&mut self) -> Vec<(String, f64, f64)> {
        if let Some(cached) = &self.flightmode_cache {
            return cached.clone();
        }
        self.rewind();
        let mut spans: Vec<(String, f64, f64)> = Vec::new();
        while let Some(msg) = self.recv_msg() {
            if msg.type_name() != "MODE" {
                continue;
            }
            let mode = self.resolve_mode(&msg);
            let t = msg.timestamp;
            match spans.last_mut() {
                Some((last_mode, _, _)) if *last_mode == mode => {}
                Some((_, _, last_end)) => {
                    *last_end = t;
                    spans.push((mode, t, t));
                }
                None => spans.push((mode, t, t)),
            }
        }
        if let Some(last) = spans.last_mut() {
            last.2 = self.last_timestamp().unwrap_or(last.2);
        }
        self.rewind();
        self.flightmode_cache = Some(spans.clone());
        spans
    }

    /// Last-seen value of parameter `name`, or `default` (spec.md §4.F
    /// `param`).
    pub fn param(&self, name: &str, default: Option<f64>) -> Option<f64> {
        self.params.get(name).copied().or(default)
    }

    fn resolve_mode(&self, msg: &Message) -> String {
        if let Some(s) = msg.get_str("Mode") {
            return s.trim_end_matches('\0').to_string();
        }
        if let Some(n) = msg.get_field("ModeNum") {
            let n = n as i64;
            let table = crate::vehicle::DefaultModeTable;
            if let Some(name) = crate::vehicle::VehicleModeTable::mode_name(&table, self.mav_type, n) {
                return name.to_string();
            }
            return crate::vehicle::legacy_mode_name(n);
        }
        "UNKNOWN".to_string()
    }

    fn update_live_state(&mut self, msg: &Message) {
        self.messages.insert(msg.type_name().to_string(), msg.clone());
        if let Some(instance) = &msg.format.instance_field {
            if let Some(v) = msg.get_field(&instance.name) {
                self.messages.insert(format!("{}[{}]", msg.type_name(), v as i64), msg.clone());
            }
        }

        match msg.type_name() {
            "MSG" => {
                if let Some(text) = msg.get_str("Message") {
                    self.mav_type = classify_banner(&text);
                }
            }
            "VER" => {
                if let Some(bu) = msg.get_field("BU") {
                    self.mav_type = match bu as i64 {
                        1 => Some(VehicleType::Rover),
                        2 => Some(VehicleType::Quadrotor),
                        3 => Some(VehicleType::FixedWing),
                        4 => Some(VehicleType::AntennaTracker),
                        7 => Some(VehicleType::Submarine),
                        12 => Some(VehicleType::Airship),
                        13 => Some(VehicleType::Heli),
                        _ => self.mav_type,
                    };
                }
            }
            "MODE" => {
                self.mode = Some(self.resolve_mode(msg));
            }
            "STAT" => {
                if let Some(state) = msg.get_field("MainState") {
                    self.mode = Some(crate::vehicle::px4_main_state_name(state as i64).to_string());
                }
            }
            "PARM" => {
                if let Some(name) = msg.get_str("Name") {
                    let name = name.trim_end_matches('\0').to_string();
                    if let Some(value) = msg.get_field("Value") {
                        self.params.insert(name.clone(), value);
                    }
                    if let Some(default) = msg.get_field("Default") {
                        if !default.is_nan() {
                            self.param_defaults.insert(name, default);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    pub fn format_by_name(&self, name: &str) -> Option<&DFFormat> {
        self.registry.get_by_name(name)
    }
}

fn classify_banner(text: &str) -> Option<VehicleType> {
    if text.contains("Rover") {
        Some(VehicleType::Rover)
    } else if text.contains("Plane") {
        Some(VehicleType::FixedWing)
    } else if text.contains("Copter") {
        Some(VehicleType::Quadrotor)
    } else if text.contains("Antenna") {
        Some(VehicleType::AntennaTracker)
    } else if text.contains("ArduSub") {
        Some(VehicleType::Submarine)
    } else if text.contains("Blimp") {
        Some(VehicleType::Airship)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::classify_banner;
    use super::VehicleType;

    #[test]
    fn banner_classification() {
        assert_eq!(classify_banner("ArduCopter V4.3.0"), Some(VehicleType::Quadrotor));
        assert_eq!(classify_banner("ArduPlane V4.3.0"), Some(VehicleType::FixedWing));
        assert_eq!(classify_banner("unrelated text"), None);
    }
}
