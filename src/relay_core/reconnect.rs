use crate::relay_core::config::WriteCadence;
use crate::relay_core::error_handler::FixedDelay;
use crate::relay_core::stream_reader::{read_stream, wall_clock_secs, FeedConnector, RelayState};
use std::time::Duration;

/// Keep a feed session running forever.
///
/// Every time a session fails (connect error, bad status, dropped or closed
/// stream) the snapshot is replaced by an empty aircraft list and the next
/// attempt starts after `delay`. Never returns; cancel by dropping the future.
pub async fn run_with_reconnect<C>(
    connector: &C,
    state: &mut RelayState,
    cadence: WriteCadence,
    delay: Duration,
) where
    C: FeedConnector + ?Sized,
{
    let mut retry = FixedDelay::new(delay);

    loop {
        log::info!("🔗 Connecting to feed: {}", connector.endpoint());

        let error = match connector.connect().await {
            Ok(mut source) => {
                log::info!("✅ Connected to feed");
                retry.reset();
                read_stream(source.as_mut(), state, cadence).await
            }
            Err(e) => e,
        };

        log::error!("❌ Feed session ended: {}", error);

        state.publish_empty(wall_clock_secs());
        retry.sleep().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay_core::error_handler::StreamError;
    use crate::relay_core::stream_reader::LineSource;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedSource {
        lines: VecDeque<String>,
    }

    #[async_trait]
    impl LineSource for ScriptedSource {
        async fn next_line(&mut self) -> Result<String, StreamError> {
            self.lines
                .pop_front()
                .ok_or_else(|| StreamError::Read("connection reset".to_string()))
        }
    }

    /// Hands out one scripted session per attempt; `None` fails the attempt.
    struct ScriptedConnector {
        sessions: Mutex<VecDeque<Option<Vec<String>>>>,
        attempts: AtomicUsize,
    }

    impl ScriptedConnector {
        fn new(sessions: Vec<Option<Vec<&str>>>) -> Self {
            let sessions = sessions
                .into_iter()
                .map(|s| s.map(|lines| lines.iter().map(|l| l.to_string()).collect()))
                .collect();
            Self {
                sessions: Mutex::new(sessions),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedConnector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn LineSource>, StreamError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.sessions.lock().unwrap().pop_front();
            match next {
                Some(Some(lines)) => Ok(Box::new(ScriptedSource {
                    lines: lines.into(),
                })),
                Some(None) => Err(StreamError::Status(503)),
                None => std::future::pending().await,
            }
        }

        fn endpoint(&self) -> &str {
            "scripted://feed"
        }
    }

    fn read_snapshot(state: &RelayState) -> Value {
        let raw = std::fs::read_to_string(state.writer.path()).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_failure_publishes_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 0.0);
        let connector = ScriptedConnector::new(vec![Some(vec![
            r#"data: {"ac": [{"hex": "a1"}]}"#,
        ])]);

        let _ = tokio::time::timeout(
            Duration::from_millis(200),
            run_with_reconnect(&connector, &mut state, WriteCadence::Line, Duration::from_secs(1)),
        )
        .await;

        // Buffer survives the outage, but the file shows it
        assert_eq!(state.buffer.len(), 1);
        assert_eq!(read_snapshot(&state)["aircraft"], json!([]));
    }

    #[tokio::test]
    async fn test_retries_after_fixed_delay() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 0.0);
        let connector = ScriptedConnector::new(vec![
            None,
            None,
            Some(vec![r#"data: {"ac": [{"hex": "b2"}]}"#]),
        ]);

        let _ = tokio::time::timeout(
            Duration::from_millis(500),
            run_with_reconnect(&connector, &mut state, WriteCadence::Line, Duration::from_millis(50)),
        )
        .await;

        // Two refused attempts, one session, then a fourth attempt that hangs
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(state.batches_received(), 1);
        assert_eq!(read_snapshot(&state)["aircraft"], json!([]));
    }

    #[tokio::test]
    async fn test_empty_snapshot_within_one_retry_cycle() {
        let dir = TempDir::new().unwrap();
        let mut state = RelayState::new(dir.path().join("aircraft.json"), 15, 1.0);
        let connector = ScriptedConnector::new(vec![None]);

        let _ = tokio::time::timeout(
            Duration::from_millis(100),
            run_with_reconnect(&connector, &mut state, WriteCadence::Line, Duration::from_secs(1)),
        )
        .await;

        assert_eq!(read_snapshot(&state)["aircraft"], json!([]));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }
}
