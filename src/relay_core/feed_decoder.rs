//! Line framing and event decoding for the push feed
//!
//! The feed is line-delimited text. Only lines starting with `data:` carry a
//! payload; the rest of the line is a JSON object whose `ac` field holds the
//! aircraft list.

use crate::relay_core::error_handler::{DecodeError, StreamError};
use serde_json::Value;

pub const EVENT_DATA_PREFIX: &str = "data:";
pub const AIRCRAFT_FIELD: &str = "ac";

/// Decode one feed line.
///
/// * `Ok(None)` - not an event-data line, or a payload without an aircraft list
/// * `Ok(Some(aircraft))` - one batch worth of records, untouched
/// * `Err(..)` - malformed payload
pub fn decode_line(line: &str) -> Result<Option<Vec<Value>>, DecodeError> {
    let payload = match line.strip_prefix(EVENT_DATA_PREFIX) {
        Some(rest) => rest.trim(),
        None => return Ok(None),
    };

    let value: Value = serde_json::from_str(payload)?;
    let mut object = match value {
        Value::Object(map) => map,
        _ => return Err(DecodeError::NotAnObject),
    };

    match object.remove(AIRCRAFT_FIELD) {
        Some(Value::Array(aircraft)) => Ok(Some(aircraft)),
        Some(_) => Err(DecodeError::AircraftNotArray),
        None => Ok(None),
    }
}

/// Longest line the framer will buffer before giving up on the session.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Splits an arbitrary chunking of the response body into lines.
///
/// Lines end at `\n`, `\r\n` or a bare `\r`, as in an event stream. Bytes
/// are held until the line is complete so multi-byte characters split across
/// chunks survive.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no terminator
    searched: usize,
    /// Last line ended with `\r` at a chunk boundary; drop a leading `\n`
    skip_lf: bool,
    max_line: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            searched: 0,
            skip_lf: false,
            max_line,
        }
    }

    pub fn push(&mut self, mut chunk: &[u8]) {
        if self.skip_lf && !chunk.is_empty() {
            if chunk[0] == b'\n' {
                chunk = &chunk[1..];
            }
            self.skip_lf = false;
        }
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line, if one is buffered.
    ///
    /// Fails once a line grows past the configured limit; the framer is
    /// cleared and the session should be dropped.
    pub fn next_line(&mut self) -> Result<Option<String>, StreamError> {
        let found = self.pending[self.searched..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
            .map(|i| i + self.searched);

        let end = match found {
            Some(end) => end,
            None => {
                self.searched = self.pending.len();
                if self.pending.len() > self.max_line {
                    return Err(self.overflow());
                }
                return Ok(None);
            }
        };
        if end > self.max_line {
            return Err(self.overflow());
        }

        let mut consumed = end + 1;
        if self.pending[end] == b'\r' {
            match self.pending.get(end + 1) {
                Some(b'\n') => consumed += 1,
                Some(_) => {}
                None => self.skip_lf = true,
            }
        }

        let line = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.drain(..consumed);
        self.searched = 0;
        Ok(Some(line))
    }

    /// Whatever is left after the stream ended, as a final line.
    pub fn finish(&mut self) -> Option<String> {
        self.searched = 0;
        self.skip_lf = false;
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn overflow(&mut self) -> StreamError {
        self.pending = Vec::new();
        self.searched = 0;
        StreamError::Read(format!("feed line exceeds {} bytes", self.max_line))
    }
}
