//! Vehicle/mode name lookups — an external collaborator per spec.md §1
//! ("network/MAVLink symbolic lookups... treated as external
//! collaborators"), supplied here as a small built-in default so the
//! reader façade has something to call without requiring every user to
//! plug in their own MAVLink symbol table.
//!
//! The numeric-mode fallback tables are grounded on ArduPilot's own
//! `mode.h` enums per vehicle firmware; kept as plain match tables in
//! the style of `fit-rs`'s `basetypes.rs` char/id lookup functions.

use crate::reader::VehicleType;

/// Maps a vehicle type and a numeric flight-mode id to its display
/// name. Callers with access to a live MAVLink symbol table can
/// provide a richer implementation; `DefaultModeTable` covers the
/// common firmware builds.
pub trait VehicleModeTable {
    fn mode_name(&self, vehicle: Option<VehicleType>, mode_num: i64) -> Option<&'static str>;
}

pub struct DefaultModeTable;

impl VehicleModeTable for DefaultModeTable {
    fn mode_name(&self, vehicle: Option<VehicleType>, mode_num: i64) -> Option<&'static str> {
        match vehicle {
            Some(VehicleType::Quadrotor) | Some(VehicleType::Heli) => copter_mode_name(mode_num),
            Some(VehicleType::FixedWing) => plane_mode_name(mode_num),
            Some(VehicleType::Rover) => rover_mode_name(mode_num),
            _ => None,
        }
    }
}

/// Legacy numeric-mode fallback used when neither `Mode` (string) nor a
/// vehicle-typed `ModeNum` lookup resolves (spec.md §4.F: "fall back to
/// legacy numeric-mode decoding").
pub fn legacy_mode_name(mode_num: i64) -> String {
    format!("Mode({mode_num})")
}

fn copter_mode_name(n: i64) -> Option<&'static str> {
    Some(match n {
        0 => "STABILIZE",
        1 => "ACRO",
        2 => "ALT_HOLD",
        3 => "AUTO",
        4 => "GUIDED",
        5 => "LOITER",
        6 => "RTL",
        7 => "CIRCLE",
        9 => "LAND",
        11 => "DRIFT",
        13 => "SPORT",
        14 => "FLIP",
        15 => "AUTOTUNE",
        16 => "POSHOLD",
        17 => "BRAKE",
        18 => "THROW",
        19 => "AVOID_ADSB",
        20 => "GUIDED_NOGPS",
        21 => "SMART_RTL",
        22 => "FLOWHOLD",
        23 => "FOLLOW",
        24 => "ZIGZAG",
        25 => "SYSTEMID",
        26 => "AUTOROTATE",
        27 => "AUTO_RTL",
        _ => return None,
    })
}

fn plane_mode_name(n: i64) -> Option<&'static str> {
    Some(match n {
        0 => "MANUAL",
        1 => "CIRCLE",
        2 => "STABILIZE",
        3 => "TRAINING",
        4 => "ACRO",
        5 => "FLY_BY_WIRE_A",
        6 => "FLY_BY_WIRE_B",
        7 => "CRUISE",
        8 => "AUTOTUNE",
        10 => "AUTO",
        11 => "RTL",
        12 => "LOITER",
        13 => "TAKEOFF",
        14 => "AVOID_ADSB",
        15 => "GUIDED",
        17 => "QSTABILIZE",
        18 => "QHOVER",
        19 => "QLOITER",
        20 => "QLAND",
        21 => "QRTL",
        22 => "QAUTOTUNE",
        23 => "QACRO",
        24 => "THERMAL",
        _ => return None,
    })
}

fn rover_mode_name(n: i64) -> Option<&'static str> {
    Some(match n {
        0 => "MANUAL",
        1 => "ACRO",
        3 => "STEERING",
        4 => "HOLD",
        5 => "LOITER",
        6 => "FOLLOW",
        7 => "SIMPLE",
        8 => "DOCK",
        10 => "AUTO",
        11 => "RTL",
        12 => "SMART_RTL",
        15 => "GUIDED",
        16 => "INITIALISING",
        _ => return None,
    })
}

/// PX4 `commander` main-state enum, used for `STAT.MainState` (spec.md
/// §4.F: "If type = STAT with MainState: set flight mode via PX4
/// mapping").
pub fn px4_main_state_name(main_state: i64) -> &'static str {
    match main_state {
        0 => "MANUAL",
        1 => "ALTCTL",
        2 => "POSCTL",
        3 => "AUTO_MISSION",
        4 => "AUTO_LOITER",
        5 => "AUTO_RTL",
        6 => "ACRO",
        7 => "OFFBOARD",
        8 => "STABILIZED",
        9 => "RATTITUDE",
        10 => "AUTO_TAKEOFF",
        11 => "AUTO_LAND",
        12 => "AUTO_FOLLOW_TARGET",
        13 => "AUTO_PRECLAND",
        14 => "ORBIT",
        15 => "AUTO_VTOL_TAKEOFF",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copter_mode_lookup() {
        let table = DefaultModeTable;
        assert_eq!(table.mode_name(Some(VehicleType::Quadrotor), 5), Some("LOITER"));
        assert_eq!(table.mode_name(Some(VehicleType::Quadrotor), 999), None);
    }

    #[test]
    fn px4_main_state_known_value() {
        assert_eq!(px4_main_state_name(5), "AUTO_RTL");
        assert_eq!(px4_main_state_name(-1), "UNKNOWN");
    }
}
