//! ADS-B feed relay
//!
//! Holds one streaming connection to a push feed of aircraft reports, keeps a
//! short sliding window of the received batches and republishes the window as
//! a tar1090-style `aircraft.json` snapshot through atomic file replacement.
//!
//! ```text
//! feed (data: {"ac": [...]}) → StreamReader → WindowBuffer
//!     ↓ once per line
//! SnapshotWriter → temp file → rename → aircraft.json
//! ```
//!
//! On any feed failure the reconnect loop publishes an empty snapshot and
//! retries after a fixed delay.

pub mod relay_core;
