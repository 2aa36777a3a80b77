use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Result, SliError};

/// Clocks between the trigger source and this service drift; end times up to
/// this many seconds in the future are still accepted.
const FUTURE_TOLERANCE_SECONDS: i64 = 120;

/// Parses a caller-supplied timestamp, trying RFC3339 first and falling back
/// to base-10 unix seconds.
pub fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let unix_seconds: i64 = timestamp
        .parse()
        .map_err(|_| SliError::InvalidTimestamp(timestamp.to_string()))?;
    DateTime::from_timestamp(unix_seconds, 0)
        .ok_or_else(|| SliError::InvalidTimestamp(timestamp.to_string()))
}

/// Renders an instant in the backend's millisecond-epoch string form.
pub fn to_backend_timestamp(instant: DateTime<Utc>) -> String {
    (instant.timestamp() * 1000).to_string()
}

/// Absolute evaluation window. Construction validates ordering and rejects
/// end times too far in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Timeframe {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let now = Utc::now();
        if (now - end).num_seconds() < -FUTURE_TOLERANCE_SECONDS {
            return Err(SliError::TimeWindow(format!(
                "supplied end time {} is too far (>{}s) in the future (now: {})",
                end, FUTURE_TOLERANCE_SECONDS, now
            )));
        }
        if (end - start).num_seconds() < 0 {
            return Err(SliError::TimeWindow(
                "start time needs to be before end time".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_timestamp(start)
            .map_err(|e| SliError::TimeWindow(format!("error parsing start date: {e}")))?;
        let end = parse_timestamp(end)
            .map_err(|e| SliError::TimeWindow(format!("error parsing end date: {e}")))?;
        Self::new(start, end)
    }

    /// How far in the past the window's end must be before the backend can be
    /// expected to have ingested all of its data. Short windows need the full
    /// margin; windows of five minutes or more can tolerate missing the last
    /// minute or two.
    pub fn ingest_wait_seconds(&self) -> i64 {
        let span = (self.end - self.start).num_seconds();
        if span >= 300 {
            0
        } else if span >= 120 {
            60
        } else {
            120
        }
    }
}

/// Blocks until the window's end is far enough in the past for the backend to
/// have complete data, polling in fixed increments. This is a pre-condition
/// gate, not a retry of a failed call. Setting `cancelled` aborts the wait.
pub async fn wait_for_ingest(frame: &Timeframe, cancelled: &AtomicBool) -> Result<()> {
    let wait_for = frame.ingest_wait_seconds();
    loop {
        let behind = (Utc::now() - frame.end).num_seconds();
        if behind >= wait_for {
            return Ok(());
        }
        if cancelled.load(Ordering::Relaxed) {
            return Err(SliError::Cancelled);
        }
        debug!(
            remaining_seconds = wait_for - behind,
            "waiting for the metrics backend to ingest the evaluated window"
        );
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}
