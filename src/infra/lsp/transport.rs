//! LSP Transport Layer
//!
//! Handles LSP message framing with Content-Length headers over any async
//! byte stream (child stdio, our own stdin/stdout, in-memory pipes).

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::FramingError;

/// Maximum frame size (16 MiB) to prevent unbounded memory allocation
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const CONTENT_LENGTH: &str = "content-length:";

/// Frame a message: `Content-Length: <n>\r\n\r\n` followed by the UTF-8 JSON body
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(message)?;
    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Reads framed JSON messages
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next message
    ///
    /// ```text
    /// Content-Length: 123\r\n
    /// \r\n
    /// {"jsonrpc":"2.0",...}
    /// ```
    ///
    /// Header lines other than `Content-Length` are skipped. A non-fatal
    /// error (see [`FramingError::is_fatal`]) leaves the reader usable.
    pub async fn read_message(&mut self) -> Result<serde_json::Value, FramingError> {
        let content_length = self.read_content_length().await?;
        self.skip_remaining_headers().await?;

        if content_length > MAX_FRAME_BYTES {
            return Err(FramingError::FrameTooLarge {
                size: content_length,
                limit: MAX_FRAME_BYTES,
            });
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FramingError::Closed("body"),
                _ => FramingError::Io(e),
            })?;

        tracing::trace!("LSP <- {}", String::from_utf8_lossy(&body));

        serde_json::from_slice(&body).map_err(FramingError::InvalidBody)
    }

    /// Scan header lines until a `Content-Length` header is found
    async fn read_content_length(&mut self) -> Result<usize, FramingError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(FramingError::Closed("header"));
            }

            let trimmed = line.trim();
            let is_length_header = trimmed
                .get(..CONTENT_LENGTH.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CONTENT_LENGTH));
            if !is_length_header {
                continue;
            }

            let value = trimmed[CONTENT_LENGTH.len()..].trim();
            return value
                .parse()
                .map_err(|_| FramingError::InvalidHeader(value.to_string()));
        }
    }

    /// Consume any further headers up to the blank separator line
    async fn skip_remaining_headers(&mut self) -> Result<(), FramingError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(FramingError::Closed("header"));
            }
            if line.trim().is_empty() {
                return Ok(());
            }
        }
    }
}

/// Writes framed JSON messages
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), FramingError> {
        let framed = encode(message).map_err(FramingError::InvalidBody)?;
        tracing::trace!("LSP -> {}", String::from_utf8_lossy(&framed));

        self.writer.write_all(&framed).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
