//! Line-oriented, timeout-capable communication channel to the device
//! under test.
//!
//! The framework never assumes a concrete transport; everything above this
//! module only relies on the [`Channel`] contract. [`serial::SerialChannel`]
//! backs it with a host serial port, [`testchannel::ScriptedChannel`] with a
//! pre-scripted in-memory buffer for tests.

use std::time::Duration;

use encoding_rs::{CoderResult, Decoder, DecoderResult, Encoding};
use thiserror::Error;

pub mod serial;
pub mod testchannel;

/// Faults the channel can raise; converted to the failure taxonomy at the
/// harness boundary.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("timed out after {timeout:?} waiting for `{pattern}`")]
    Timeout {
        pattern: String,
        timeout: Duration,
        /// Decoded device output received so far.
        buffer: String,
    },
    #[error("device channel closed: {detail}")]
    Eof { detail: String, buffer: String },
    #[error("cannot decode device output as {encoding}: {detail}")]
    Decode {
        encoding: &'static str,
        detail: String,
    },
    #[error("invalid expect pattern `{pattern}`: {detail}")]
    Pattern { pattern: String, detail: String },
}

/// Policy for bytes that do not decode under the configured encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Undecodable input raises [`ChannelError::Decode`].
    Strict,
    /// Undecodable input is replaced with U+FFFD.
    #[default]
    Replace,
}

/// Communication channel to the device under test.
///
/// `expect` blocks the calling stage until the pattern matches, the timeout
/// elapses or the transport closes; there is no other wait primitive.
pub trait Channel {
    /// Write raw bytes to the device.
    fn write(&mut self, data: &[u8]) -> Result<(), ChannelError>;

    /// Block until `pattern` (a regex) matches the decoded receive buffer.
    ///
    /// Returns the buffered text up to and including the match; the matched
    /// portion is consumed from the buffer.
    fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String, ChannelError>;

    /// Discard any buffered device output.
    fn clear_buffer(&mut self);

    /// Write a full line, terminated for the device's shell.
    fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        self.write(line.as_bytes())?;
        self.write(b"\n")
    }
}

/// Incremental decoder for the channel's configured text encoding.
///
/// Byte sequences split across reads are buffered by the inner decoder, so
/// feeding a multi-byte character in two chunks is fine.
pub struct StreamDecoder {
    encoding: &'static Encoding,
    decoder: Decoder,
    policy: DecodePolicy,
}

impl StreamDecoder {
    pub fn new(encoding: &'static Encoding, policy: DecodePolicy) -> Self {
        Self {
            encoding,
            decoder: encoding.new_decoder(),
            policy,
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decode `chunk`, appending the result to `out`.
    pub fn push(&mut self, chunk: &[u8], out: &mut String) -> Result<(), ChannelError> {
        let mut read = 0;
        while read < chunk.len() {
            let remaining = &chunk[read..];
            match self.policy {
                DecodePolicy::Replace => {
                    let needed = self
                        .decoder
                        .max_utf8_buffer_length(remaining.len())
                        .unwrap_or(remaining.len() * 3);
                    out.reserve(needed);
                    let (result, consumed, _) = self.decoder.decode_to_string(remaining, out, false);
                    read += consumed;
                    if matches!(result, CoderResult::InputEmpty) {
                        break;
                    }
                }
                DecodePolicy::Strict => {
                    let needed = self
                        .decoder
                        .max_utf8_buffer_length_without_replacement(remaining.len())
                        .unwrap_or(remaining.len() * 3);
                    out.reserve(needed);
                    let (result, consumed) = self
                        .decoder
                        .decode_to_string_without_replacement(remaining, out, false);
                    read += consumed;
                    match result {
                        DecoderResult::InputEmpty => break,
                        DecoderResult::OutputFull => continue,
                        DecoderResult::Malformed(_, _) => {
                            // Reset so a later read does not trip over the
                            // leftover state of the aborted sequence.
                            self.decoder = self.encoding.new_decoder();
                            return Err(ChannelError::Decode {
                                encoding: self.encoding.name(),
                                detail: format!("malformed byte sequence near offset {read}"),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
