//! Terminal progress output

use chrono::Local;
use colored::Colorize;
use stategraph_core::ProgressSink;
use std::time::Duration;

/// Prints progress lines as `[HH:MM:SS | +elapsed]  message`.
///
/// Messages reporting success are green, everything else yellow.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn emit(&self, elapsed: Duration, message: &str) {
        let now = Local::now().format("%H:%M:%S").to_string();
        let prefix = prefix(&now, elapsed);

        let body = if is_success(message) {
            message.green()
        } else {
            message.yellow()
        };
        println!("{} {}", prefix.bright_black(), body);
    }
}

pub(crate) fn prefix(clock: &str, elapsed: Duration) -> String {
    format!("[{} | +{:06.2}s]", clock, elapsed.as_secs_f64())
}

pub(crate) fn is_success(message: &str) -> bool {
    message.contains("successfully")
}
