//! Fuzz target: dated file names
//!
//! Retention decisions hinge on `parse_file_date`, which sees whatever
//! happens to be on the card.  Verifies:
//! - No panics on arbitrary names
//! - Any date that parses re-renders to the same `YYYY-MM-DD` text
//!
//! cargo fuzz run fuzz_file_date

#![no_main]

use libfuzzer_sys::fuzz_target;
use panel_sentinel::logger::layout::{LogCategory, daily_path, parse_file_date};

fuzz_target!(|data: &[u8]| {
    let Ok(name) = core::str::from_utf8(data) else {
        return;
    };

    let Some(date) = parse_file_date(name) else {
        return;
    };

    let path = daily_path(LogCategory::System, "system_", date, "log");
    let rendered = path.rsplit('/').next().unwrap_or_default();
    assert_eq!(
        parse_file_date(rendered),
        Some(date),
        "{name:?} parsed to {date} but {rendered:?} does not"
    );
});
