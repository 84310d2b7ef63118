//! Crash reporting sink for dispatch failures

/// Receives failures the dispatcher observes before re-raising them
pub trait CrashReporter: Send + Sync {
    /// `source` identifies where the failure happened (e.g. "dispatch:openai")
    fn report(&self, source: &str, error: &str);
}

/// Reporter that writes failures to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCrashReporter;

impl CrashReporter for LogCrashReporter {
    fn report(&self, source: &str, error: &str) {
        log::error!("[{}] {}", source, error);
    }
}
