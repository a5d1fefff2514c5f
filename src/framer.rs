use crate::error::{Error, Result};
use bytes::BytesMut;
use futures::stream::{self, Stream};
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 1024;

/// Splits a byte stream into LF-terminated text lines.
///
/// Trailing CR/LF is trimmed and blank lines are skipped. Only one reader
/// may own a framer; it can't be restarted once the stream ends.
pub struct LineFramer<R> {
    reader: R,
    buffer: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Next non-blank line, `Ok(None)` at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = extract_next_line(&mut self.buffer) {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            self.buffer.reserve(READ_CHUNK);
            let n = self
                .reader
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| Error::Transport(format!("read failed: {}", e)))?;
            if n == 0 {
                self.eof = true;
                // flush an unterminated last line
                if !self.buffer.is_empty() && !self.buffer.ends_with(b"\n") {
                    self.buffer.extend_from_slice(b"\n");
                }
            }
        }
    }

    /// The framer as a lazy stream of lines. A read error is yielded once
    /// and ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> {
        stream::unfold(Some(self), |state| async move {
            let mut framer = state?;
            match framer.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some(framer))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

fn extract_next_line(buffer: &mut BytesMut) -> Option<String> {
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line_bytes = buffer.split_to(pos + 1);
        let line = String::from_utf8_lossy(&line_bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if line.is_empty() {
            continue;
        }
        trace!("RCV: {}", line);
        return Some(line);
    }
    None
}
