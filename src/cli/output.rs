//! Console output helpers shared by the subcommands.
//!
//! Global flags are exported as environment variables by `main` so any
//! module can check them without threading a config value around.

use indicatif::{ProgressBar, ProgressStyle};

/// True when `--quiet` was passed.
pub fn is_quiet() -> bool {
    std::env::var("FONTGRAB_QUIET").is_ok()
}

/// True when `--verbose` was passed.
pub fn is_verbose() -> bool {
    std::env::var("FONTGRAB_VERBOSE").is_ok()
}

/// Counter-style spinner for discovery, where the total is unknown.
pub fn spinner(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}: {pos}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar
}

/// Bounded bar for per-item stages.
pub fn bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(message);
    bar
}
