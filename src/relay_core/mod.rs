pub mod config;
pub mod error_handler;
pub mod feed_decoder;
pub mod reconnect;
pub mod runtime;
pub mod snapshot_writer;
pub mod stream_reader;
pub mod window_buffer;

pub use config::{RelayConfig, WriteCadence};
pub use error_handler::{DecodeError, StreamError};
pub use reconnect::run_with_reconnect;
pub use runtime::{run, run_until};
pub use snapshot_writer::{Snapshot, SnapshotWriter, WriterError};
pub use stream_reader::{FeedConnector, HttpConnector, LineSource, RelayState};
pub use window_buffer::{Batch, WindowBuffer};
