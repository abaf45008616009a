//! Output-mode helpers shared by the subcommands.
//!
//! The global `--json`, `--quiet`, and `--verbose` flags are exported as
//! environment variables by `main` so every module can check them without
//! threading a context value through the call tree.

pub fn is_json() -> bool {
    std::env::var("MODSCOUT_JSON").is_ok()
}

pub fn is_quiet() -> bool {
    std::env::var("MODSCOUT_QUIET").is_ok()
}

pub fn is_verbose() -> bool {
    std::env::var("MODSCOUT_VERBOSE").is_ok()
}

/// Print a machine-readable JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(body) => println!("{body}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

/// Print a human line unless quiet or JSON mode is active.
pub fn say(line: &str) {
    if !is_quiet() && !is_json() {
        println!("{line}");
    }
}
