//! Utility modules for appup
//!
//! - [`fs`] - download directory helpers with registered temporary files
//! - [`process`] - liveness checks, signals and external command execution
//! - [`progress`] - `indicatif` progress bars honouring `APPUP_NO_PROGRESS`

pub mod fs;
pub mod process;
pub mod progress;

pub use fs::{atomic_write, ensure_dir};
pub use process::{CommandOutcome, CommandRunner, CommandSpec, SystemRunner};
pub use progress::ProgressBar;
