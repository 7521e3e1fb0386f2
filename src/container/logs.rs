//! Container log streams.
//!
//! Docker multiplexes stdout and stderr of a non-TTY container on a single
//! stream of frames:
//!
//! ```text
//! [stream: 1 byte][reserved: 3 bytes][length: 4 bytes, big-endian][payload]
//! ```
//!
//! [`LogFrameCodec`] decodes and encodes that framing. [`follow_all`] attaches
//! to every container of a foreground run and prints each line with a colored
//! per-container tag until the governing context is cancelled.

use crate::container::{ContainerError, Engine, Result, ServiceDescriptor};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Size of a frame header.
pub const HEADER_LEN: usize = 8;

/// Delay before reattaching to a log stream that ended or failed.
pub const REATTACH_DELAY: Duration = Duration::from_millis(500);

const TAG_COLORS: &[u8] = &[36, 33, 32, 35, 34, 31];

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI pattern"));

/// Stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Stream type byte of the frame header.
    pub fn as_byte(self) -> u8 {
        match self {
            StreamKind::Stdin => 0,
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
        }
    }

    /// Parse a stream type byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StreamKind::Stdin),
            1 => Some(StreamKind::Stdout),
            2 => Some(StreamKind::Stderr),
            _ => None,
        }
    }
}

/// One demultiplexed log frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamKind,
    pub payload: Bytes,
}

impl LogFrame {
    pub fn new(stream: StreamKind, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            payload: payload.into(),
        }
    }
}

impl From<bollard::container::LogOutput> for LogFrame {
    fn from(output: bollard::container::LogOutput) -> Self {
        use bollard::container::LogOutput;
        match output {
            LogOutput::StdIn { message } => Self::new(StreamKind::Stdin, message),
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                Self::new(StreamKind::Stdout, message)
            }
            LogOutput::StdErr { message } => Self::new(StreamKind::Stderr, message),
        }
    }
}

/// Codec for the multiplexed log frame protocol.
///
/// The bollard client hands over frames it has already demultiplexed, so
/// this codec is the reference for the wire format. Test engines use it to
/// replay recorded streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFrameCodec;

impl Decoder for LogFrameCodec {
    type Item = LogFrame;
    type Error = ContainerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LogFrame>> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let stream = StreamKind::from_byte(src[0]).ok_or_else(|| {
            ContainerError::StreamError(format!("Unknown stream type {}", src[0]))
        })?;
        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(LogFrame { stream, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<LogFrame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ContainerError::StreamError(format!(
                "Stream ended inside a frame ({} bytes left)",
                src.len()
            ))),
        }
    }
}

impl Encoder<LogFrame> for LogFrameCodec {
    type Error = ContainerError;

    fn encode(&mut self, frame: LogFrame, dst: &mut BytesMut) -> Result<()> {
        let len = u32::try_from(frame.payload.len()).map_err(|_| {
            ContainerError::StreamError(format!(
                "Frame payload too large: {} bytes",
                frame.payload.len()
            ))
        })?;

        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_u8(frame.stream.as_byte());
        dst.put_slice(&[0, 0, 0]);
        dst.put_u32(len);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

/// Remove the first ANSI escape sequence of a line.
pub fn strip_first_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace(line, "")
}

/// Colored `[name]` tag for the `index`-th container.
pub fn color_tag(name: &str, index: usize) -> String {
    let color = TAG_COLORS[index % TAG_COLORS.len()];
    format!("\x1b[{}m[{}]\x1b[0m", color, name)
}

/// Splits frame payloads into tagged lines.
///
/// Frames do not align with lines, so partial lines are buffered until
/// their newline arrives.
#[derive(Debug)]
pub struct LinePrinter {
    tag: String,
    pending: Vec<u8>,
}

impl LinePrinter {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            pending: Vec::new(),
        }
    }

    /// Feed a payload, returning every completed line.
    pub fn push(&mut self, payload: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(payload);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(self.format(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Flush a trailing partial line.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(self.format(&raw))
    }

    fn format(&self, raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        let text = text.strip_suffix('\r').unwrap_or(&text);
        format!("{} {}", self.tag, strip_first_ansi(text))
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Follow the logs of every service until `cancel` fires.
///
/// Each line is handed to `sink` prefixed with the container's colored tag.
/// A stream that ends or fails is reattached after [`REATTACH_DELAY`], asking
/// for lines since the second it dropped. The engine treats that bound as
/// inclusive, so lines logged within that second may be printed twice.
pub async fn follow_all(
    engine: &dyn Engine,
    services: &[ServiceDescriptor],
    cancel: &CancellationToken,
    sink: &(dyn Fn(String) + Send + Sync),
) {
    let followers = services.iter().enumerate().map(|(index, service)| {
        follow(
            engine,
            &service.name,
            color_tag(&service.name, index),
            cancel,
            sink,
        )
    });
    futures::future::join_all(followers).await;
}

async fn follow(
    engine: &dyn Engine,
    name: &str,
    tag: String,
    cancel: &CancellationToken,
    sink: &(dyn Fn(String) + Send + Sync),
) {
    let mut since = None;

    loop {
        let mut printer = LinePrinter::new(tag.clone());
        let mut on_frame = |frame: LogFrame| {
            for line in printer.push(&frame.payload) {
                sink(line);
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = engine.stream_logs(name, since, &mut on_frame) => Some(result),
        };
        if let Some(line) = printer.flush() {
            sink(line);
        }

        match result {
            None => break,
            Some(Ok(())) => debug!("Log stream for {} ended, reattaching", name),
            Some(Err(e)) => warn!("Log stream for {} failed: {}, reattaching", name, e),
        }

        since = Some(unix_now());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(REATTACH_DELAY) => {}
        }
    }

    debug!("Stopped following logs for {}", name);
}
