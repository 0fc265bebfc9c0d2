use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

/// Delimiter used by the line parser.
pub const LINE_DELIMITER: &[u8] = b"\r\n";

const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Failed to open serial device {path} at {baud_rate} baud: {source}")]
    Open {
        path: String,
        baud_rate: u32,
        #[source]
        source: tokio_serial::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub line_parser_enabled: bool,
}

impl SerialSettings {
    /// Open the device and return its lines, or its raw chunks when the line
    /// parser is disabled.
    pub fn open(&self) -> Result<BoxStream<'static, io::Result<String>>, SerialError> {
        let port = tokio_serial::new(&self.path, self.baud_rate)
            .open_native_async()
            .map_err(|source| SerialError::Open {
                path: self.path.clone(),
                baud_rate: self.baud_rate,
                source,
            })?;

        info!(
            "Opened serial device {} at {} baud (line parser {}).",
            self.path,
            self.baud_rate,
            if self.line_parser_enabled { "enabled" } else { "disabled" }
        );

        Ok(serial_stream(port, self.line_parser_enabled))
    }
}

pub fn serial_stream<R>(reader: R, line_parser_enabled: bool) -> BoxStream<'static, io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    if line_parser_enabled {
        line_stream(reader).boxed()
    } else {
        chunk_stream(reader).boxed()
    }
}

/// Split `reader` on `\r\n`. A lone `\n` stays part of the line, and a trailing
/// fragment without delimiter is dropped at end of stream. The stream ends
/// after the first I/O error.
pub fn line_stream<R>(reader: R) -> impl futures::Stream<Item = io::Result<String>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(
        Some((BufReader::new(reader), Vec::new())),
        |state| async move {
            let (mut reader, mut pending) = state?;
            loop {
                match reader.read_until(b'\n', &mut pending).await {
                    Ok(0) => return None,
                    Ok(_) if pending.ends_with(LINE_DELIMITER) => {
                        pending.truncate(pending.len() - LINE_DELIMITER.len());
                        let line = String::from_utf8_lossy(&pending).into_owned();
                        pending.clear();
                        return Some((Ok(line), Some((reader, pending))));
                    }
                    Ok(_) => continue,
                    Err(e) => return Some((Err(e), None)),
                }
            }
        },
    )
}

/// Yield every read from `reader` as-is. A multi-byte character split across
/// reads is held back until its remaining bytes arrive.
pub fn chunk_stream<R>(reader: R) -> impl futures::Stream<Item = io::Result<String>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(Some((reader, Vec::new())), |state| async move {
        let (mut reader, mut pending) = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) if pending.is_empty() => return None,
                Ok(0) => return Some((Ok(String::from_utf8_lossy(&pending).into_owned()), None)),
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let split = incomplete_tail_start(&pending);
                    if split == 0 {
                        continue;
                    }
                    let tail = pending.split_off(split);
                    let chunk = String::from_utf8_lossy(&pending).into_owned();
                    return Some((Ok(chunk), Some((reader, tail))));
                }
                Err(e) => return Some((Err(e), None)),
            }
        }
    })
}

/// Index where a trailing, not yet complete UTF-8 sequence starts, or `bytes.len()`.
fn incomplete_tail_start(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if needed > back { len - back } else { len };
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_lines_split_on_crlf() {
        let input: &[u8] = b"Temperature: 23.5\r\nHumidity: 61.9\r\n";
        let lines: Vec<String> = line_stream(input).try_collect().await.unwrap();
        assert_eq!(lines, vec!["Temperature: 23.5", "Humidity: 61.9"]);
    }

    #[tokio::test]
    async fn test_lone_newline_does_not_split() {
        let input: &[u8] = b"a\nb\r\nc";
        let lines: Vec<String> = line_stream(input).try_collect().await.unwrap();
        assert_eq!(lines, vec!["a\nb"]);
    }

    #[tokio::test]
    async fn test_lines_across_partial_writes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            tx.write_all(b"Temper").await.unwrap();
            tx.write_all(b"ature: 20\r").await.unwrap();
            tx.write_all(b"\nHumidity: 50\r\n").await.unwrap();
        });
        let lines: Vec<String> = line_stream(rx).try_collect().await.unwrap();
        writer.await.unwrap();
        assert_eq!(lines, vec!["Temperature: 20", "Humidity: 50"]);
    }

    #[tokio::test]
    async fn test_chunks_are_passed_through() {
        let input: &[u8] = b"Humidity: 40\r\n";
        let chunks: Vec<String> = serial_stream(input, false).try_collect().await.unwrap();
        assert_eq!(chunks.concat(), "Humidity: 40\r\n");
    }

    #[tokio::test]
    async fn test_chunks_keep_split_characters_intact() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            tx.write_all(b"Temperature: 21 \xC2").await.unwrap();
            tx.flush().await.unwrap();
            tokio::task::yield_now().await;
            tx.write_all(b"\xB0C\r\n").await.unwrap();
        });
        let chunks: Vec<String> = chunk_stream(rx).try_collect().await.unwrap();
        writer.await.unwrap();
        assert_eq!(chunks.concat(), "Temperature: 21 \u{B0}C\r\n");
        assert!(chunks.iter().all(|c| !c.contains('\u{FFFD}')));
    }

    #[test]
    fn test_incomplete_tail_start() {
        assert_eq!(incomplete_tail_start(b"abc"), 3);
        assert_eq!(incomplete_tail_start(b"ab\xC2"), 2);
        assert_eq!(incomplete_tail_start(b"a\xE2\x82"), 1);
        assert_eq!(incomplete_tail_start("a\u{20AC}".as_bytes()), 4);
        assert_eq!(incomplete_tail_start(b""), 0);
    }
}
