#![no_main]
use focus_config::{RangeRow, RangeTable};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<(u32, i32, i32)>, u32)| {
    let (raw, zoom) = input;
    let rows = raw
        .into_iter()
        .map(|(zoom, start, end)| RangeRow { zoom, start, end })
        .collect();
    // Accepted tables must answer every zoom query without panicking.
    if let Ok(table) = RangeTable::from_rows(rows) {
        let (start, _end) = table.hint_for_zoom(zoom);
        assert!(start >= 0);
    }
});
