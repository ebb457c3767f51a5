use crate::relay_core::config::{RelayConfig, WriteCadence, MAX_SECONDS};
use crate::relay_core::error_handler::StreamError;
use crate::relay_core::feed_decoder::{decode_line, LineFramer};
use crate::relay_core::snapshot_writer::SnapshotWriter;
use crate::relay_core::window_buffer::{Batch, WindowBuffer};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, timeout, timeout_at, Instant, MissedTickBehavior};

/// Current wall-clock time in fractional epoch seconds.
pub fn wall_clock_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// One open feed session, yielding text lines.
///
/// `next_line` must be cancel safe: dropping the future before it resolves
/// must not lose a line. The timer cadence relies on this.
#[async_trait]
pub trait LineSource: Send {
    /// The next line, or the error that ended the session.
    async fn next_line(&mut self) -> Result<String, StreamError>;
}

#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LineSource>, StreamError>;

    /// Endpoint description for logging
    fn endpoint(&self) -> &str;
}

pub struct HttpConnector {
    client: reqwest::Client,
    url: String,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(config: &RelayConfig) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| StreamError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: config.stream_url.clone(),
            request_timeout: config.request_timeout,
        })
    }
}

#[async_trait]
impl FeedConnector for HttpConnector {
    async fn connect(&self) -> Result<Box<dyn LineSource>, StreamError> {
        let response = timeout(self.request_timeout, self.client.get(&self.url).send())
            .await
            .map_err(|_| StreamError::Timeout(self.request_timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }

        Ok(Box::new(HttpLineSource::new(response, self.request_timeout)))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Streamed response body split into lines.
pub struct HttpLineSource {
    response: reqwest::Response,
    framer: LineFramer,
    read_timeout: Duration,
    last_data: Instant,
    finished: bool,
}

impl HttpLineSource {
    pub fn new(response: reqwest::Response, read_timeout: Duration) -> Self {
        Self {
            response,
            framer: LineFramer::new(),
            read_timeout,
            last_data: Instant::now(),
            finished: false,
        }
    }
}

#[async_trait]
impl LineSource for HttpLineSource {
    async fn next_line(&mut self) -> Result<String, StreamError> {
        loop {
            if let Some(line) = self.framer.next_line()? {
                return Ok(line);
            }
            if self.finished {
                return Err(StreamError::Closed);
            }

            // Deadline is measured from the last data, not from this call,
            // so a cancelled and re-polled read still times out.
            let deadline = self
                .last_data
                .checked_add(self.read_timeout.min(Duration::from_secs_f64(MAX_SECONDS)))
                .unwrap_or(self.last_data);
            match timeout_at(deadline, self.response.chunk()).await {
                Err(_) => return Err(StreamError::Timeout(self.read_timeout)),
                Ok(Err(e)) => return Err(StreamError::Read(e.to_string())),
                Ok(Ok(Some(bytes))) => {
                    self.last_data = Instant::now();
                    self.framer.push(&bytes);
                }
                Ok(Ok(None)) => {
                    self.finished = true;
                    if let Some(line) = self.framer.finish() {
                        return Ok(line);
                    }
                }
            }
        }
    }
}

/// Everything the read loop owns: the window, the snapshot writer and counters.
pub struct RelayState {
    pub buffer: WindowBuffer,
    pub writer: SnapshotWriter,
    window_secs: i64,
    write_every_s: f64,
    batches_received: u64,
    malformed_lines: u64,
    last_stats_log: std::time::Instant,
}

impl RelayState {
    pub fn new(out_path: impl Into<PathBuf>, window_secs: i64, write_every_s: f64) -> Self {
        Self {
            buffer: WindowBuffer::new(),
            writer: SnapshotWriter::new(out_path, window_secs),
            window_secs,
            write_every_s,
            batches_received: 0,
            malformed_lines: 0,
            last_stats_log: std::time::Instant::now(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.out_path.clone(), config.buffer_sec, config.write_every_s)
    }

    pub fn batches_received(&self) -> u64 {
        self.batches_received
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }

    /// Decode a line and, if it carries aircraft, append it as a batch stamped
    /// `now`, then trim. Malformed lines leave the buffer untouched.
    pub fn handle_line(&mut self, line: &str, now: f64) {
        match decode_line(line) {
            Ok(Some(aircraft)) => {
                let timestamp = now.floor() as i64;
                let count = aircraft.len();
                self.buffer.append(Batch::new(timestamp, aircraft));
                let evicted = self.buffer.trim(timestamp, self.window_secs);
                self.batches_received += 1;

                log::trace!(
                    "✈️  Batch of {} aircraft at {} ({} evicted, {} buffered)",
                    count,
                    timestamp,
                    evicted,
                    self.buffer.len()
                );
            }
            Ok(None) => {}
            Err(e) => {
                self.malformed_lines += 1;
                log::debug!("⚠️  Skipping malformed feed line: {}", e);
            }
        }
    }

    /// Snapshot cadence check. Write failures are logged and retried on the
    /// next check.
    pub fn tick(&mut self, now: f64) {
        if let Err(e) = self.writer.maybe_write(&self.buffer, now, self.write_every_s) {
            log::error!(
                "❌ Failed to write snapshot to {}: {}",
                self.writer.path().display(),
                e
            );
        }

        if self.last_stats_log.elapsed() >= Duration::from_secs(60) {
            log::info!(
                "📊 Relay: {} batches received, {} malformed lines, {} batches buffered, {} snapshots written",
                self.batches_received,
                self.malformed_lines,
                self.buffer.len(),
                self.writer.writes()
            );
            self.last_stats_log = std::time::Instant::now();
        }
    }

    /// One received line: ingest, then cadence check.
    pub fn ingest_line(&mut self, line: &str, now: f64) {
        self.handle_line(line, now);
        self.tick(now);
    }

    /// Replace the snapshot with an empty aircraft list so consumers see the outage.
    pub fn publish_empty(&mut self, now: f64) {
        if let Err(e) = self.writer.write_empty(now.floor() as i64) {
            log::error!(
                "❌ Failed to write empty snapshot to {}: {}",
                self.writer.path().display(),
                e
            );
        }
    }

    /// Unconditional merged write.
    pub fn publish_final(&mut self, now: f64) {
        if let Err(e) = self.writer.write_now(&self.buffer, now.floor() as i64) {
            log::error!("❌ Failed to write final snapshot: {}", e);
        }
    }
}

/// Interval for the timer cadence, kept within `[10ms, MAX_SECONDS]`.
fn timer_period(write_every_s: f64) -> Duration {
    Duration::try_from_secs_f64(write_every_s.clamp(0.01, MAX_SECONDS))
        .unwrap_or(Duration::from_secs_f64(MAX_SECONDS))
}

/// Read lines from `source` into `state` until the session ends.
///
/// Always returns the error that ended the session. With
/// [`WriteCadence::Timer`] the cadence check also runs every `write_every_s`
/// while the feed is quiet.
pub async fn read_stream(
    source: &mut dyn LineSource,
    state: &mut RelayState,
    cadence: WriteCadence,
) -> StreamError {
    match cadence {
        WriteCadence::Line => loop {
            match source.next_line().await {
                Ok(line) => state.ingest_line(&line, wall_clock_secs()),
                Err(e) => return e,
            }
        },
        WriteCadence::Timer => {
            let period = timer_period(state.write_every_s);
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    line = source.next_line() => match line {
                        Ok(line) => state.ingest_line(&line, wall_clock_secs()),
                        Err(e) => return e,
                    },
                    _ = timer.tick() => state.tick(wall_clock_secs()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Scripted session: yields the given lines, then ends with `Closed`.
    struct ScriptedSource {
        lines: VecDeque<String>,
    }

    impl ScriptedSource {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl LineSource for ScriptedSource {
        async fn next_line(&mut self) -> Result<String, StreamError> {
            self.lines.pop_front().ok_or(StreamError::Closed)
        }
    }

    fn read_snapshot(state: &RelayState) -> Value {
        let raw = std::fs::read_to_string(state.writer.path()).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_malformed_line_leaves_buffer_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 1.0);

        state.handle_line(r#"data: {"ac": [{"hex": "a1"}]}"#, 100.0);
        state.handle_line("data: {\"ac\": [", 101.0);
        state.handle_line(r#"data: {"ac": [{"hex": "b2"}]}"#, 102.0);

        assert_eq!(state.buffer.len(), 2);
        assert_eq!(state.batches_received(), 2);
        assert_eq!(state.malformed_lines(), 1);
    }

    #[test]
    fn test_handle_line_trims_on_append() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 1.0);

        state.handle_line(r#"data: {"ac": ["A"]}"#, 0.2);
        state.handle_line(r#"data: {"ac": ["B"]}"#, 5.9);
        state.handle_line(r#"data: {"ac": ["C"]}"#, 20.5);

        let kept: Vec<i64> = state.buffer.batches().map(|b| b.timestamp).collect();
        assert_eq!(kept, vec![5, 20]);
    }

    #[test]
    fn test_ingest_line_writes_on_first_line() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 1.0);

        state.ingest_line(": keepalive", 50.0);

        assert_eq!(read_snapshot(&state), json!({"now": 50, "aircraft": []}));
    }

    #[tokio::test]
    async fn test_read_stream_ingests_until_closed() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 0.0);
        let mut source = ScriptedSource::new(&[
            "event: aircraft",
            r#"data: {"now": 1, "ac": [{"hex": "a1"}, {"hex": "b2"}]}"#,
            "data: not-json",
            "",
            r#"data: {"ac": [{"hex": "a1"}]}"#,
        ]);

        let err = read_stream(&mut source, &mut state, WriteCadence::Line).await;

        assert!(matches!(err, StreamError::Closed));
        assert_eq!(state.batches_received(), 2);
        assert_eq!(state.malformed_lines(), 1);
        assert_eq!(
            read_snapshot(&state)["aircraft"],
            json!([{"hex": "a1"}, {"hex": "b2"}, {"hex": "a1"}])
        );
    }

    /// Session that yields one line, then stays silent forever.
    struct SilentSource {
        first: Option<String>,
    }

    #[async_trait]
    impl LineSource for SilentSource {
        async fn next_line(&mut self) -> Result<String, StreamError> {
            match self.first.take() {
                Some(line) => Ok(line),
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_line_cadence_writes_nothing_while_feed_is_silent() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 0.05);
        let mut source = SilentSource {
            first: Some(r#"data: {"ac": [{"hex": "a1"}]}"#.to_string()),
        };

        let _ = tokio::time::timeout(
            Duration::from_millis(300),
            read_stream(&mut source, &mut state, WriteCadence::Line),
        )
        .await;

        assert_eq!(state.writer.writes(), 1);
    }

    #[test]
    fn test_timer_period_bounds() {
        assert_eq!(timer_period(0.0), Duration::from_millis(10));
        assert_eq!(timer_period(1.5), Duration::from_millis(1500));
        assert_eq!(timer_period(1e20), Duration::from_secs(86_400));
        assert_eq!(timer_period(f64::NAN), Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_timer_cadence_with_huge_interval_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 1e20);
        let mut source = ScriptedSource::new(&[r#"data: {"ac": [{"hex": "a1"}]}"#]);

        let err = read_stream(&mut source, &mut state, WriteCadence::Timer).await;

        assert!(matches!(err, StreamError::Closed));
        assert_eq!(state.batches_received(), 1);
    }

    #[tokio::test]
    async fn test_timer_cadence_keeps_writing_while_feed_is_silent() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 0.05);
        let mut source = SilentSource {
            first: Some(r#"data: {"ac": [{"hex": "a1"}]}"#.to_string()),
        };

        let _ = tokio::time::timeout(
            Duration::from_millis(300),
            read_stream(&mut source, &mut state, WriteCadence::Timer),
        )
        .await;

        assert!(state.writer.writes() >= 3, "writes = {}", state.writer.writes());
        assert_eq!(read_snapshot(&state)["aircraft"], json!([{"hex": "a1"}]));
    }
}
