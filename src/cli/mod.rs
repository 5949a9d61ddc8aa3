//! CLI subcommand implementations for the fontgrab binary.

pub mod doctor;
pub mod grab_cmd;
pub mod normalize_cmd;
pub mod output;
