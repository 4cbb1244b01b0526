//! Serial transport for the device channel.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::*;
use regex::Regex;
use serialport::SerialPort;

use super::{Channel, ChannelError, DecodePolicy, StreamDecoder};

/// Poll granularity for the blocking expect loop
const READ_POLL: Duration = Duration::from_millis(50);

/// [`Channel`] backed by a host serial port.
///
/// Received bytes are decoded incrementally under the configured encoding;
/// the decoded text is what `expect` patterns match against.
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    decoder: StreamDecoder,
    buffer: String,
}

impl SerialChannel {
    /// Open `path` at `baudrate` with UTF-8 decoding and the lenient
    /// undecodable-byte policy.
    pub fn open(path: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(path, baudrate)
            .timeout(READ_POLL)
            .open()
            .with_context(|| format!("opening serial port {path}"))?;
        info!("opened {path} at {baudrate} baud");
        Ok(Self {
            port,
            decoder: StreamDecoder::new(encoding_rs::UTF_8, DecodePolicy::Replace),
            buffer: String::new(),
        })
    }

    /// Override the text encoding and undecodable-byte policy.
    #[must_use]
    pub fn with_encoding(mut self, encoding: &'static Encoding, policy: DecodePolicy) -> Self {
        self.decoder = StreamDecoder::new(encoding, policy);
        self
    }

    /// Pull whatever the port has pending into the decoded buffer.
    /// Returns false once the port reports end-of-stream.
    fn fill(&mut self) -> Result<bool, ChannelError> {
        let mut chunk = [0u8; 4096];
        match self.port.read(&mut chunk) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.decoder.push(&chunk[..n], &mut self.buffer)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(true),
            Err(e) => Err(ChannelError::Eof {
                detail: e.to_string(),
                buffer: std::mem::take(&mut self.buffer),
            }),
        }
    }
}

impl Channel for SerialChannel {
    fn write(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.port.write_all(data).map_err(|e| ChannelError::Eof {
            detail: e.to_string(),
            buffer: std::mem::take(&mut self.buffer),
        })
    }

    fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String, ChannelError> {
        let re = Regex::new(pattern).map_err(|e| ChannelError::Pattern {
            pattern: pattern.to_string(),
            detail: e.to_string(),
        })?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(m) = re.find(&self.buffer) {
                let end = m.end();
                let matched: String = self.buffer.drain(..end).collect();
                trace!("matched `{pattern}` after {} buffered bytes", end);
                return Ok(matched);
            }
            if Instant::now() >= deadline {
                return Err(ChannelError::Timeout {
                    pattern: pattern.to_string(),
                    timeout,
                    buffer: self.buffer.clone(),
                });
            }
            if !self.fill()? {
                return Err(ChannelError::Eof {
                    detail: "end of stream".into(),
                    buffer: std::mem::take(&mut self.buffer),
                });
            }
        }
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        if let Err(e) = self.port.clear(serialport::ClearBuffer::Input) {
            warn!("could not clear serial input buffer: {e}");
        }
    }
}
