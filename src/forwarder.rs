use crate::classifier::classify_now;
use crate::models::Reading;
use crate::serial_reader::SerialError;
use futures::{Stream, StreamExt};
use std::io;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error(transparent)]
    Serial(#[from] SerialError),
    #[error("Serial read failed: {0}")]
    Read(#[source] io::Error),
}

/// Destination for classified readings.
#[allow(async_fn_in_trait)]
pub trait ReadingSink {
    /// Returns whether the reading was handed off.
    async fn publish(&self, reading: &Reading) -> bool;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub lines: u64,
    pub published: u64,
    pub dropped: u64,
}

/// Classify every line and publish the readings, one at a time in arrival order.
/// Returns when the stream ends, or with the first read error.
pub async fn run<S, P>(mut lines: S, sink: &P) -> Result<ForwardStats, ForwarderError>
where
    S: Stream<Item = io::Result<String>> + Unpin,
    P: ReadingSink,
{
    let mut stats = ForwardStats::default();

    while let Some(line) = lines.next().await {
        let line = line.map_err(ForwarderError::Read)?;
        stats.lines += 1;

        match classify_now(&line) {
            Some(reading) => {
                if sink.publish(&reading).await {
                    stats.published += 1;
                }
            }
            None => {
                debug!("Dropping unclassified line: {:?}", line);
                stats.dropped += 1;
            }
        }
    }

    info!("Serial stream ended after {} lines.", stats.lines);
    Ok(stats)
}
