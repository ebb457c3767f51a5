use std::time::Duration;
use tokio::time::sleep;

/// A feed line that could not be turned into a batch. Never leaves the read loop.
#[derive(Debug)]
pub enum DecodeError {
    InvalidJson(serde_json::Error),
    NotAnObject,
    AircraftNotArray,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::InvalidJson(err)
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidJson(e) => write!(f, "Invalid JSON payload: {}", e),
            DecodeError::NotAnObject => write!(f, "Payload is not a JSON object"),
            DecodeError::AircraftNotArray => write!(f, "Aircraft field is not an array"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Anything that ends a streaming session. Always handed to the reconnect loop.
#[derive(Debug)]
pub enum StreamError {
    Client(String),
    Connection(String),
    Status(u16),
    Read(String),
    Timeout(Duration),
    Closed,
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_request() {
            StreamError::Connection(err.to_string())
        } else {
            StreamError::Read(err.to_string())
        }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Client(msg) => write!(f, "HTTP client error: {}", msg),
            StreamError::Connection(msg) => write!(f, "Connection error: {}", msg),
            StreamError::Status(code) => write!(f, "Feed returned HTTP {}", code),
            StreamError::Read(msg) => write!(f, "Read error: {}", msg),
            StreamError::Timeout(after) => write!(f, "No data from feed for {:.1}s", after.as_secs_f64()),
            StreamError::Closed => write!(f, "Feed closed the stream"),
        }
    }
}

impl std::error::Error for StreamError {}

/// Fixed pause between reconnect attempts. No backoff, no retry limit.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    attempt: u64,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempt: 0 }
    }

    pub async fn sleep(&mut self) {
        self.attempt += 1;

        log::warn!(
            "⏳ Reconnect attempt {} in {:.1}s",
            self.attempt,
            self.delay.as_secs_f64()
        );

        sleep(self.delay).await;
    }

    /// Number of retries since the last successful connection.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_delay_counts_attempts() {
        let mut delay = FixedDelay::new(Duration::from_millis(1));

        delay.sleep().await;
        delay.sleep().await;
        assert_eq!(delay.attempt(), 2);

        delay.reset();
        assert_eq!(delay.attempt(), 0);
    }

    #[test]
    fn test_decode_error_from_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let decode: DecodeError = err.into();
        assert!(matches!(decode, DecodeError::InvalidJson(_)));
        assert!(decode.to_string().starts_with("Invalid JSON payload"));
    }
}
