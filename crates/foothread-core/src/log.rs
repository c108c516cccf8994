//! Structured diagnostics.
//!
//! Events are written to stderr as one JSON object per line. The threshold is
//! read from `FOOTHREAD_LOG` (`trace|debug|info|warn|error|fatal|off`, default
//! `warn`) on first use and can be overridden with [`set_threshold`]. Fatal
//! entries are always written.

use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::ident::NativeId;

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Parse a level name (case-insensitive). `off` and unknown names give `None`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }

    const fn to_u8(self) -> u8 {
        self as u8 + 1
    }
}

/// One diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            level,
            event: event.into(),
            op: None,
            thread_id: None,
            native_id: None,
            errno: None,
            details: None,
        }
    }

    /// Name the library operation the event belongs to.
    #[must_use]
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Attach a foothread control-block id.
    #[must_use]
    pub fn with_thread(mut self, id: u64) -> Self {
        self.thread_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_native(mut self, id: NativeId) -> Self {
        self.native_id = Some(id.as_raw());
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// 0 = unresolved, 1..=6 = LogLevel::to_u8, 255 = off.
static THRESHOLD: AtomicU8 = AtomicU8::new(0);

const THRESHOLD_UNRESOLVED: u8 = 0;
const THRESHOLD_OFF: u8 = 255;

fn threshold() -> u8 {
    let cached = THRESHOLD.load(Ordering::Relaxed);
    if cached != THRESHOLD_UNRESOLVED {
        return cached;
    }
    let resolved = match std::env::var("FOOTHREAD_LOG") {
        Ok(raw) => LogLevel::from_str_loose(&raw).map_or(THRESHOLD_OFF, LogLevel::to_u8),
        Err(_) => LogLevel::Warn.to_u8(),
    };
    // Racing resolvers read the same environment; last store wins harmlessly.
    THRESHOLD.store(resolved, Ordering::Relaxed);
    resolved
}

/// Override the threshold. `None` silences everything below fatal.
pub fn set_threshold(level: Option<LogLevel>) {
    THRESHOLD.store(level.map_or(THRESHOLD_OFF, LogLevel::to_u8), Ordering::Relaxed);
}

/// Whether an entry at `level` would be written.
#[must_use]
pub fn enabled(level: LogLevel) -> bool {
    level == LogLevel::Fatal || {
        let t = threshold();
        t != THRESHOLD_OFF && level.to_u8() >= t
    }
}

/// Write `entry` to stderr if its level passes the threshold.
pub fn emit(entry: &LogEntry) {
    if !enabled(entry.level) {
        return;
    }
    if let Ok(line) = entry.to_jsonl() {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}

/// Report a broken mutex invariant and terminate the process.
pub(crate) fn fatal(op: &'static str, err: SyncError) -> ! {
    let entry = LogEntry::new(LogLevel::Fatal, "invariant_violation")
        .with_op(op)
        .with_native(NativeId::current())
        .with_errno(err.errno())
        .with_details(serde_json::json!({ "error": err.to_string() }));
    emit(&entry);
    std::process::exit(1);
}

fn now_utc() -> String {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = elapsed.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        elapsed.subsec_millis(),
    )
}

// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_required_fields_only() {
        let entry = LogEntry::new(LogLevel::Info, "thread_create");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "thread_create");
        assert!(parsed.get("op").is_none());
        assert!(parsed.get("thread_id").is_none());
        assert!(parsed.get("details").is_none());
    }

    #[test]
    fn optional_fields_round_trip() {
        let entry = LogEntry::new(LogLevel::Fatal, "invariant_violation")
            .with_op("mutex_unlock")
            .with_thread(7)
            .with_errno(libc::EPERM);
        let json = entry.to_jsonl().unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.op.as_deref(), Some("mutex_unlock"));
        assert_eq!(back.thread_id, Some(7));
        assert_eq!(back.errno, Some(libc::EPERM));
        assert_eq!(back.level, LogLevel::Fatal);
    }

    #[test]
    fn level_parsing() {
        assert_eq!(LogLevel::from_str_loose("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str_loose("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose("off"), None);
        assert!(LogLevel::Trace < LogLevel::Fatal);
    }

    #[test]
    fn fatal_always_passes_threshold() {
        assert!(enabled(LogLevel::Fatal));
    }

    #[test]
    fn timestamp_shape() {
        let ts = now_utc();
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
    }
}
