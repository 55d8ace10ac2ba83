//! Progress indicators for downloads.
//!
//! Progress is drawn to stderr with `indicatif`. Bars are hidden when:
//! - `APPUP_NO_PROGRESS` is set to any value
//! - the caller asks for a hidden bar (`--no-progress` or quiet mode)
//!
//! Hidden bars accept every call and draw nothing, so callers never branch on
//! visibility.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Environment variable that disables all progress output.
pub const NO_PROGRESS_ENV: &str = "APPUP_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A byte-count progress bar, or a spinner while the total is unknown.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Download bar for `total` bytes. Hidden unless `visible` and progress
    /// is enabled.
    pub fn download(total: u64, visible: bool) -> Self {
        let bar = if visible && !is_progress_disabled() {
            let bar = IndicatifBar::new(total);
            bar.set_style(download_style());
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self {
            inner: bar,
        }
    }

    /// Animated spinner with `msg`.
    pub fn spinner(msg: impl Into<String>, visible: bool) -> Self {
        let bar = if visible && !is_progress_disabled() {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            IndicatifBar::hidden()
        };
        bar.set_message(msg.into());
        Self {
            inner: bar,
        }
    }

    /// Set the text shown before the bar.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    /// Set the current position.
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Advance by `delta`.
    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    /// Stop and erase the bar.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
