//! Stable exit codes for forge CLI commands.

/// Command succeeded; for `forge run`, the pipeline reached `done`.
pub const OK: i32 = 0;
/// Invalid usage or configuration, unreadable input, or a failed store/clear.
pub const INVALID: i32 = 1;
/// `forge run` halted at a gate; the printed result names the stage.
pub const HALTED: i32 = 2;
