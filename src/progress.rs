//! Batch progress reporting.
//!
//! Reports observable progress during `etd process` so operators see which
//! package is being worked on, how many remain, and how the run ended.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a batch run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchProgressEvent {
    /// Listing package directories under the batch root. Total unknown.
    Discovering { root: String },
    /// Package `n` of `total` (1-based) is being processed.
    Processing {
        package: String,
        n: u64,
        total: u64,
    },
    /// Every package has a ledger entry.
    Finished {
        accepted: u64,
        warned: u64,
        rejected: u64,
    },
}

/// Receives batch progress. Implementations write to stderr (human or JSON).
pub trait BatchProgressReporter: Send + Sync {
    fn report(&self, event: BatchProgressEvent);
}

/// Human-friendly progress on stderr: "etd  processing  12 / 1,500  pkg-0012".
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Discovering { root } => {
                format!("etd  discovering packages in {}...\n", root)
            }
            BatchProgressEvent::Processing { package, n, total } => format!(
                "etd  processing  {} / {}  {}\n",
                format_number(*n),
                format_number(*total),
                package
            ),
            BatchProgressEvent::Finished {
                accepted,
                warned,
                rejected,
            } => format!(
                "etd  done  {} accepted, {} with warnings, {} rejected\n",
                format_number(*accepted),
                format_number(*warned),
                format_number(*rejected)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &BatchProgressEvent) -> serde_json::Value {
        match event {
            BatchProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "root": root
            }),
            BatchProgressEvent::Processing { package, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "package": package,
                "n": n,
                "total": total
            }),
            BatchProgressEvent::Finished {
                accepted,
                warned,
                rejected,
            } => serde_json::json!({
                "event": "finished",
                "accepted": accepted,
                "accepted_with_warnings": warned,
                "rejected": rejected
            }),
        }
    }
}

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
