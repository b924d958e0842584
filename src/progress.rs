//! Batch progress reporting.
//!
//! The document processor emits one [`BatchProgressEvent`] per finished
//! document. `deskrag import` and `deskrag reprocess` turn those into
//! progress lines on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// One document of a batch finished (successfully or not).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchProgressEvent {
    /// Documents finished so far, including this one.
    pub completed: usize,
    pub total: usize,
    pub title: String,
    pub success: bool,
}

/// Callback shape accepted by the processor's batch operations.
pub type ProgressCallback = Arc<dyn Fn(&BatchProgressEvent) + Send + Sync>;

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    fn report(&self, event: &BatchProgressEvent);
}

/// Human-friendly progress on stderr: "processed  12 / 1,204  Refund Policy".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: &BatchProgressEvent) {
        let line = format!(
            "processed  {} / {}  {}{}\n",
            format_number(event.completed as u64),
            format_number(event.total as u64),
            event.title,
            if event.success { "" } else { "  (failed)" }
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: &BatchProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "completed": event.completed,
            "total": event.total,
            "title": event.title,
            "success": event.success,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: &BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }

    /// Wrap the reporter as a processor callback.
    pub fn callback(&self) -> ProgressCallback {
        let reporter = self.reporter();
        Arc::new(move |event: &BatchProgressEvent| reporter.report(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn callback_forwards_to_reporter() {
        let cb = ProgressMode::Off.callback();
        cb(&BatchProgressEvent {
            completed: 1,
            total: 2,
            title: "FAQ".into(),
            success: true,
        });
    }
}
