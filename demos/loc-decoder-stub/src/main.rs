//! Reference implementation of the table-based LOC sibling-decoder
//! contract: given a `loc_id` as the sole argument, print one line of
//! `file:line[:function]` to stdout and exit 0, or exit non-zero if the id
//! is unknown.
//!
//! A real sibling decoder would look this up from a table generated
//! alongside the producer binary; this stub hardcodes a handful of entries
//! so integration tests and examples have something concrete to invoke.

use std::process::ExitCode;

const TABLE: &[(u32, &str, u32, &str)] = &[
    (1, "producer.src", 42, "do_work"),
    (2, "producer.src", 7, "setup"),
];

fn main() -> ExitCode {
    let Some(arg) = std::env::args().nth(1) else {
        eprintln!("usage: loc-decoder-stub <loc_id>");
        return ExitCode::FAILURE;
    };
    let Ok(loc_id) = arg.parse::<u32>() else {
        eprintln!("loc-decoder-stub: '{arg}' is not a valid loc_id");
        return ExitCode::FAILURE;
    };

    match TABLE.iter().find(|(id, ..)| *id == loc_id) {
        Some((_, file, line, function)) => {
            println!("{file}:{line}:{function}");
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("loc-decoder-stub: unknown loc_id {loc_id}");
            ExitCode::FAILURE
        }
    }
}
