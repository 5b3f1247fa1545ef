//! Line framing for control channel connections.
//!
//! One message per `\n`-terminated line. Blank lines carry no message and
//! are skipped by the decoder; an outgoing message that contains a newline
//! would split into two frames and is refused by the encoder.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Default bound on one inbound line: 256 KiB.
pub const MAX_LINE_BYTES: usize = 262_144;

/// Framing codec used on both halves of a control channel connection.
#[derive(Debug)]
pub struct ControlCodec {
    lines: LinesCodec,
    max_line: usize,
}

impl ControlCodec {
    /// Codec bounded by [`MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec that rejects inbound lines longer than `max_line` bytes.
    #[must_use]
    pub fn with_max_length(max_line: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line),
            max_line,
        }
    }

    /// Bound on one inbound line.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_line
    }

    fn framing_error(&self, err: LinesCodecError) -> AppError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => AppError::Protocol(format!(
                "line too long: exceeded {} bytes",
                self.max_line
            )),
            LinesCodecError::Io(err) => AppError::Io(err.to_string()),
        }
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(line) => return Ok(line),
                Err(err) => return Err(self.framing_error(err)),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(line) => return Ok(line),
                Err(err) => return Err(self.framing_error(err)),
            }
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for ControlCodec {
    type Error = AppError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let line = item.as_ref();
        if line.contains('\n') {
            return Err(AppError::Protocol(
                "outgoing message spans more than one line".into(),
            ));
        }
        self.lines
            .encode(line, dst)
            .map_err(|err| self.framing_error(err))
    }
}
