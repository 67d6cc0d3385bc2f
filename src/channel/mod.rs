//! Newline-delimited JSON transport between presentation processes and the coordinator.

mod codec;
mod server;

use sync_protocol::WireError;
use thiserror::Error;

pub use codec::{recover_request_id, write_frame, FrameReader, InboundLine, MAX_FRAME_BYTES};
pub use server::serve_connection;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("channel closed")]
    Closed,
    #[error("no reply within {after_ms} ms")]
    Timeout { after_ms: u64 },
}

impl From<ChannelError> for WireError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::Encode(_) => WireError::validation(error.to_string()),
            ChannelError::Io(_) | ChannelError::Closed | ChannelError::Timeout { .. } => {
                WireError::transient(error.to_string())
            }
        }
    }
}
