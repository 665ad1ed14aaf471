//! Fuzz target: console command parser
//!
//! Feeds arbitrary console lines to `DiagCommand::from_str` and checks:
//! - No panics on any UTF-8 input
//! - Anything accepted still parses after re-casing the key
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use panel_sentinel::app::commands::DiagCommand;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = core::str::from_utf8(data) else {
        return;
    };

    let Ok(cmd) = line.parse::<DiagCommand>() else {
        return;
    };

    // Keys are case-insensitive: flipping the key's case must not change
    // the result.
    let (key, rest) = match line.split_once('=') {
        Some((k, v)) => (k, Some(v)),
        None => (line, None),
    };
    let flipped: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect();
    let relined = match rest {
        Some(v) => format!("{flipped}={v}"),
        None => flipped,
    };
    assert_eq!(relined.parse::<DiagCommand>(), Ok(cmd), "case changed the command");
});
