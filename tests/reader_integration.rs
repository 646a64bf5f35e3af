//! End-to-end scenarios straight out of spec.md §8, driven through the
//! public `Reader` façade against a real (temp-file-backed) memory map.

use std::io::Write;

use dflog_rs::format::{DFFormat, FMT_COLUMNS, FMT_FORMAT_SPEC, FMT_RECORD_LENGTH, FMT_TYPE_ID};
use dflog_rs::reader::{Reader, ReaderOptions};
use dflog_rs::value::Value;

fn temp_path(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("dflog_rs_test_{name}_{}.bin", std::process::id()));
    p
}

fn write_log(name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = temp_path(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(bytes).unwrap();
    path
}

fn fmt_record_bytes(type_id: u8, record_length: usize, name: &str, format: &str, columns: &str) -> Vec<u8> {
    let bootstrap = DFFormat::bootstrap();
    let values = vec![
        Value::U8(type_id),
        Value::U8(record_length as u8),
        Value::Str(name.as_bytes().to_vec()),
        Value::Str(format.as_bytes().to_vec()),
        Value::Str(columns.as_bytes().to_vec()),
    ];
    dflog_rs::codec::encode(&bootstrap, &values)
}

#[test]
fn scenario_bootstrap_only() {
    let bytes = fmt_record_bytes(FMT_TYPE_ID, FMT_RECORD_LENGTH, "FMT", FMT_FORMAT_SPEC, FMT_COLUMNS);
    let path = write_log("bootstrap", &bytes);
    let mut reader = Reader::open(&path, ReaderOptions::default()).unwrap();
    let first = reader.recv_msg();
    assert!(first.is_some());
    assert_eq!(first.unwrap().type_name(), "FMT");
    assert!(reader.recv_msg().is_none());
    std::fs::remove_file(path).ok();
}

#[test]
fn scenario_unit_binding() {
    let mut bytes = Vec::new();
    bytes.extend(fmt_record_bytes(FMT_TYPE_ID, FMT_RECORD_LENGTH, "FMT", FMT_FORMAT_SPEC, FMT_COLUMNS));
    // define type T: columns X,Y / format iI
    bytes.extend(fmt_record_bytes(100, 3 + 4 + 4, "T", "iI", "X,Y"));

    // UNIT id 'd' -> "deg"
    let unit_fmt = DFFormat::new(101, 3 + 1 + 16, "UNIT".into(), "BN", "Id,Label").unwrap();
    bytes.extend(fmt_record_bytes(101, unit_fmt.record_length, "UNIT", "BN", "Id,Label"));
    bytes.extend(dflog_rs::codec::encode(&unit_fmt, &[Value::U8(b'd'), Value::Str(b"deg".to_vec())]));

    // MULT id '-' -> 0.01
    let mult_fmt = DFFormat::new(102, 3 + 1 + 8, "MULT".into(), "Bd", "Id,Mult").unwrap();
    bytes.extend(fmt_record_bytes(102, mult_fmt.record_length, "MULT", "Bd", "Id,Mult"));
    bytes.extend(dflog_rs::codec::encode(&mult_fmt, &[Value::U8(b'-'), Value::F64(0.01)]));

    // FMTU binding T's units to "d#" and mults to "--"
    let fmtu_fmt = DFFormat::new(103, 3 + 1 + 16 + 16, "FMTU".into(), "BNN", "FmtType,UnitIds,MultIds").unwrap();
    bytes.extend(fmt_record_bytes(103, fmtu_fmt.record_length, "FMTU", "BNN", "FmtType,UnitIds,MultIds"));
    bytes.extend(dflog_rs::codec::encode(
        &fmtu_fmt,
        &[Value::U8(100), Value::Str(b"d#".to_vec()), Value::Str(b"--".to_vec())],
    ));

    let path = write_log("unit_binding", &bytes);
    let reader = Reader::open(&path, ReaderOptions::default()).unwrap();
    let t_fmt = reader.registry.get_by_name("T").unwrap();
    assert!(t_fmt.instance_field.is_some());
    assert_eq!(t_fmt.instance_field.as_ref().unwrap().name, "Y");
    assert_eq!(t_fmt.units[0], "cdeg");
    // Y is marked as the instance field by '#' in the unit-id string, which
    // does not itself resolve through unit_lookup, so Y's own unit stays
    // empty (matches the original DFFormat.set_unit_ids/set_mult_ids: a
    // column with no unit is left untouched by the multiplier prefix step).
    assert_eq!(t_fmt.units[1], "");
    std::fs::remove_file(path).ok();
}

#[test]
fn scenario_scaling_latlon() {
    let fmt = DFFormat::new(50, 3 + 4, "GPL".into(), "L", "Lat").unwrap();
    let payload = 473_977_000i32.to_le_bytes();
    let values = dflog_rs::codec::decode(&fmt, &payload).unwrap();
    let msg = dflog_rs::Message::new(std::sync::Arc::new(fmt), values);
    let scaled = msg.get_field("Lat").unwrap();
    assert!((scaled - 47.3977).abs() < 1e-6);
}

#[test]
fn scenario_resync_past_corruption() {
    let mut bytes = fmt_record_bytes(FMT_TYPE_ID, FMT_RECORD_LENGTH, "FMT", FMT_FORMAT_SPEC, FMT_COLUMNS);
    bytes.extend(fmt_record_bytes(10, 3 + 1 + 2, "XYZ", "bh", "A,B"));
    let xyz_fmt = DFFormat::new(10, 3 + 1 + 2, "XYZ".into(), "bh", "A,B").unwrap();
    bytes.extend(dflog_rs::codec::encode(&xyz_fmt, &[Value::I8(-5), Value::I16(1234)]));
    bytes.extend(std::iter::repeat(0u8).take(10)); // 10 zero bytes of corruption
    bytes.extend(dflog_rs::codec::encode(&xyz_fmt, &[Value::I8(9), Value::I16(42)]));

    let path = write_log("resync", &bytes);
    let mut reader = Reader::open(&path, ReaderOptions::default()).unwrap();
    let mut seen = Vec::new();
    while let Some(msg) = reader.recv_msg() {
        if msg.type_name() == "XYZ" {
            seen.push((msg.get_field("A").unwrap(), msg.get_field("B").unwrap()));
        }
    }
    assert_eq!(seen, vec![(-5.0, 1234.0), (9.0, 42.0)]);
    std::fs::remove_file(path).ok();
}

#[test]
fn scenario_text_dialect_roundtrip() {
    let text = "FMT, 128, 89, FMT, BBnNZ, Type,Length,Name,Format,Columns\n\
                FMT, 10, 9, XYZ, bh, A,B\n\
                XYZ, -5, 1234\n\
                XYZ, 9, 42\n";
    let path = write_log("text_dialect", text.as_bytes());
    let mut reader = Reader::open(&path, ReaderOptions::default()).unwrap();
    let mut seen = Vec::new();
    while let Some(msg) = reader.recv_msg() {
        if msg.type_name() == "XYZ" {
            seen.push((msg.get_field("A").unwrap(), msg.get_field("B").unwrap()));
        }
    }
    assert_eq!(seen, vec![(-5.0, 1234.0), (9.0, 42.0)]);
    std::fs::remove_file(path).ok();
}

#[test]
fn scenario_flightmode_list_collapses_consecutive() {
    let mut bytes = fmt_record_bytes(FMT_TYPE_ID, FMT_RECORD_LENGTH, "FMT", FMT_FORMAT_SPEC, FMT_COLUMNS);
    // TimeUS-bearing carrier so the µs clock has something to latch onto;
    // MODE records stamp via the running clock state (None here), so each
    // record simply inherits timestamp 0.0 -- sufficient to exercise
    // collapsing of consecutive identical modes.
    let mode_fmt = DFFormat::new(60, 3 + 8 + 1, "MODE".into(), "qM", "TimeUS,ModeNum").unwrap();
    bytes.extend(fmt_record_bytes(60, mode_fmt.record_length, "MODE", "qM", "TimeUS,ModeNum"));
    for (t, mode) in [(0i64, 0i8), (10, 0), (20, 1)] {
        bytes.extend(dflog_rs::codec::encode(&mode_fmt, &[Value::I64(t), Value::I8(mode)]));
    }

    let path = write_log("flightmode", &bytes);
    let mut reader = Reader::open(&path, ReaderOptions::default()).unwrap();
    let spans = reader.flightmode_list();
    assert_eq!(spans.len(), 2);
    // First span must run until the *transition* timestamp (20us), not
    // freeze at its own last duplicate (10us).
    assert_eq!(spans[0].1, 0.0);
    assert!((spans[0].2 - 20e-6).abs() < 1e-9);
    assert!((spans[1].1 - 20e-6).abs() < 1e-9);
    assert!((spans[1].2 - 20e-6).abs() < 1e-9);
    std::fs::remove_file(path).ok();
}
