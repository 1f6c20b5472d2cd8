//! JSON-lines encoding of envelopes and a line-oriented ingress pump.
//!
//! One envelope per line, internally tagged:
//!
//! ```text
//! {"type":"insert","item":"item-0"}
//! {"type":"sync_request","requester":1}
//! ```
//!
//! The pump is the only place untrusted input enters the cluster. Lines with
//! an unknown tag or a bad shape are logged and skipped; the rest of the
//! stream still gets delivered.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::envelope::{Envelope, NodeId, Origin};
use crate::transport::Transport;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encodes `envelope` as a single JSON line, without the trailing newline.
pub fn encode_line(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

pub fn decode_line(line: &str) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_str(line.trim_end_matches(LINE_ENDINGS))?)
}

/// Counts of what [`pump_lines`] did with its input.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngressReport {
    /// Lines decoded and queued at the destination.
    pub accepted: usize,
    /// Lines that failed to decode.
    pub rejected: usize,
    /// Lines decoded fine but refused by the transport.
    pub undeliverable: usize,
}

/// Reads envelope lines until EOF and sends each one to node `to` as a client.
///
/// Only I/O errors on `reader` end the pump early.
pub async fn pump_lines<R>(
    reader: &mut R,
    transport: &dyn Transport,
    to: NodeId,
) -> io::Result<IngressReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = IngressReport::default();
    let mut line = String::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        line_no += 1;

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.trim().is_empty() {
            continue;
        }

        let envelope = match decode_line(trimmed) {
            Ok(envelope) => envelope,
            Err(error) => {
                report.rejected += 1;
                warn!(line = line_no, %error, "rejected ingress line");
                continue;
            }
        };

        match transport.send(Origin::Client, to, envelope) {
            Ok(()) => {
                report.accepted += 1;
                debug!(line = line_no, node = to, "ingress envelope queued");
            }
            Err(error) => {
                report.undeliverable += 1;
                warn!(line = line_no, node = to, %error, "ingress envelope not delivered");
            }
        }
    }

    Ok(report)
}
