//! Component A (part 2): the live format table, keyed by numeric type id
//! and by name, plus the `UNIT`/`MULT` side tables that decorate it.
//!
//! Grounded on `fit-rs`'s `Fit` struct holding `definitions:
//! HashMap<u8, DefinitionMessage>` (`fit/fit.rs`) — here a single
//! registry owns both the id-keyed map and the derived name index, since
//! DataFlash format names are looked up often enough (by `FMTU`'s target
//! type, and by callers wanting e.g. `registry.get_by_name("GPS")`) to
//! warrant keeping both directions current.

use std::collections::HashMap;

use crate::format::{DFFormat, InstanceField};

/// `MULT_TO_PREFIX`: SI prefix for a handful of well-known multipliers
/// (spec.md §4.A). Reified as a process-local constant table per the
/// design note ("Global `FORMAT_TO_STRUCT` and `MULT_TO_PREFIX` are pure
/// lookup tables — reify as immutable process-local constants").
const MULT_TO_PREFIX: &[(f64, &str)] = &[
    (1.0, ""),
    (1.0e-1, "d"),
    (1.0e-2, "c"),
    (1.0e-3, "m"),
    (1.0e-6, "\u{b5}"),
    (1.0e-9, "n"),
];

/// Round `x` to `sig` significant decimal digits, matching the
/// original's `float("%.7g" % value)` round-trip so multiplier values
/// logged as single-precision-cast-to-double compare equal to the
/// `MULT_TO_PREFIX` keys above.
pub fn round_sig(x: f64, sig: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let factor = 10f64.powi(sig - 1 - magnitude);
    (x * factor).round() / factor
}

fn mult_prefix(mult: f64) -> Option<&'static str> {
    MULT_TO_PREFIX
        .iter()
        .find(|(m, _)| (*m - mult).abs() < f64::EPSILON)
        .map(|(_, p)| *p)
}

#[derive(Debug, Default)]
pub struct FormatRegistry {
    by_id: HashMap<u8, DFFormat>,
    name_to_id: HashMap<String, u8>,
    pub unit_lookup: HashMap<char, String>,
    pub mult_lookup: HashMap<char, f64>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        let mut reg = FormatRegistry::default();
        reg.insert(DFFormat::bootstrap());
        reg
    }

    pub fn get(&self, type_id: u8) -> Option<&DFFormat> {
        self.by_id.get(&type_id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&DFFormat> {
        self.name_to_id.get(name).and_then(|id| self.by_id.get(id))
    }

    pub fn contains(&self, type_id: u8) -> bool {
        self.by_id.contains_key(&type_id)
    }

    /// Insert/redefine a format. If a prior definition for the same type
    /// id existed, its units and instance field carry over (spec.md §4.A:
    /// "Adding a new format preserves units/instance info if a prior
    /// record for the same id existed").
    pub fn insert(&mut self, mut format: DFFormat) {
        if let Some(old) = self.by_id.get(&format.type_id) {
            if old.units.iter().any(|u| !u.is_empty()) {
                format.units = old.units.clone();
                if format.units.len() != format.columns.len() {
                    format.units.resize(format.columns.len(), String::new());
                }
            }
            if let Some(old_instance) = &old.instance_field {
                if let Some(idx) = format.column_index.get(&old_instance.name).copied() {
                    set_instance_field(&mut format, idx);
                }
            }
        }
        self.name_to_id.insert(format.name.clone(), format.type_id);
        self.by_id.insert(format.type_id, format);
    }

    pub fn set_units(&mut self, type_id: u8, unit_ids: &str) {
        let unit_lookup = self.unit_lookup.clone();
        if let Some(fmt) = self.by_id.get_mut(&type_id) {
            if let Some(idx) = unit_ids.find('#') {
                set_instance_field(fmt, idx);
            }
            fmt.units = vec![String::new(); fmt.columns.len()];
            for (i, u) in fmt.units.iter_mut().enumerate() {
                if let Some(c) = unit_ids.chars().nth(i) {
                    if let Some(label) = unit_lookup.get(&c) {
                        *u = label.clone();
                    }
                }
            }
        }
    }

    pub fn set_multipliers(&mut self, type_id: u8, mult_ids: &str) {
        let mult_lookup = self.mult_lookup.clone();
        if let Some(fmt) = self.by_id.get_mut(&type_id) {
            let mult_chars: Vec<char> = mult_ids.chars().collect();
            for i in 0..fmt.units.len() {
                if fmt.msg_mults[i].is_some() || fmt.units[i].is_empty() {
                    continue;
                }
                let Some(&c) = mult_chars.get(i) else { continue };
                let Some(&unitmult) = mult_lookup.get(&c) else { continue };
                if let Some(prefix) = mult_prefix(unitmult) {
                    fmt.units[i] = format!("{prefix}{}", fmt.units[i]);
                } else {
                    fmt.units[i] = format!("{} {}", format_g4(unitmult), fmt.units[i]);
                }
            }
        }
    }

    pub fn record_unit(&mut self, id_char: char, label: String) {
        self.unit_lookup.insert(id_char, label);
    }

    pub fn record_mult(&mut self, id_char: char, value: f64) {
        self.mult_lookup.insert(id_char, round_sig(value, 7));
    }

    pub fn iter(&self) -> impl Iterator<Item = &DFFormat> {
        self.by_id.values()
    }
}

fn set_instance_field(fmt: &mut DFFormat, idx: usize) {
    let name = match fmt.columns.get(idx) {
        Some(n) => n.clone(),
        None => return,
    };
    let offset = fmt.field_offsets.get(idx).copied().unwrap_or(0);
    let len = fmt
        .format_spec
        .get(idx)
        .map(|fc| fc.wire_size())
        .unwrap_or(0);
    fmt.instance_field = Some(InstanceField { name, offset, len });
}

/// `%.4g`-equivalent: 4 significant digits, general (fixed-or-exponent)
/// notation, matching the fallback branch of the original's
/// `"%.4g %s" % (unitmult, unit)`.
fn format_g4(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    // %g only switches to exponential notation for extreme magnitudes;
    // mirror that by formatting as fixed-point when the exponent is small.
    let exp = v.abs().log10().floor() as i32;
    if (-4..4).contains(&exp) {
        let decimals = (3 - exp).max(0) as usize;
        let mut out = format!("{:.*}", decimals, v);
        if out.contains('.') {
            while out.ends_with('0') {
                out.pop();
            }
            if out.ends_with('.') {
                out.pop();
            }
        }
        out
    } else {
        format!("{:.*e}", 3, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_registered() {
        let reg = FormatRegistry::new();
        let fmt = reg.get(0x80).unwrap();
        assert_eq!(fmt.name, "FMT");
        assert_eq!(reg.get_by_name("FMT").unwrap().type_id, 0x80);
    }

    #[test]
    fn round_sig_matches_g7() {
        assert_eq!(round_sig(0.009999999776482582, 7), 0.01);
    }

    #[test]
    fn mult_prefix_lookup() {
        assert_eq!(mult_prefix(0.01), Some("c"));
        assert_eq!(mult_prefix(1.0), Some(""));
        assert_eq!(mult_prefix(0.05), None);
    }
}
