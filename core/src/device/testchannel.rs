//! Scripted in-memory device channel for tests.
//!
//! Plays back pre-fed device output and records every operation a stage
//! performs, so tests can assert on both the result and the interaction.

use std::time::Duration;

use regex::Regex;

use super::{Channel, ChannelError, DecodePolicy, StreamDecoder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Write(Vec<u8>),
    Expect(String),
    ClearBuffer,
}

/// Test double for [`Channel`].
///
/// `expect` never waits: it either matches what has been fed, or fails
/// immediately with a timeout (or EOF once [`ScriptedChannel::close`] was
/// called). Raw feeds go through a strict decoder so undecodable bytes
/// exercise the decode-fault path.
pub struct ScriptedChannel {
    pending: String,
    raw: Vec<u8>,
    after_clear: std::collections::VecDeque<String>,
    decoder: StreamDecoder,
    closed: bool,
    ops: Vec<ChannelOp>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            raw: Vec::new(),
            after_clear: std::collections::VecDeque::new(),
            decoder: StreamDecoder::new(encoding_rs::UTF_8, DecodePolicy::Strict),
            closed: false,
            ops: Vec::new(),
        }
    }

    /// Queue device output for subsequent expects.
    pub fn feed(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    /// Queue raw device bytes; decoded strictly on the next expect.
    pub fn feed_raw(&mut self, bytes: &[u8]) {
        self.raw.extend_from_slice(bytes);
    }

    /// Queue output the device produces after the next buffer clear, e.g.
    /// the boot banner that follows a power cycle.
    pub fn feed_after_clear(&mut self, text: &str) {
        self.after_clear.push_back(text.to_string());
    }

    /// Simulate the transport closing; subsequent expects raise EOF.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn ops(&self) -> &[ChannelOp] {
        &self.ops
    }

    /// All bytes written to the device, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                ChannelOp::Write(data) => Some(data.as_slice()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .concat()
    }

    pub fn clear_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, ChannelOp::ClearBuffer))
            .count()
    }

    fn drain_raw(&mut self) -> Result<(), ChannelError> {
        if self.raw.is_empty() {
            return Ok(());
        }
        let raw = std::mem::take(&mut self.raw);
        self.decoder.push(&raw, &mut self.pending)
    }
}

impl Channel for ScriptedChannel {
    fn write(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.ops.push(ChannelOp::Write(data.to_vec()));
        if self.closed {
            return Err(ChannelError::Eof {
                detail: "channel closed".into(),
                buffer: self.pending.clone(),
            });
        }
        Ok(())
    }

    fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String, ChannelError> {
        self.ops.push(ChannelOp::Expect(pattern.to_string()));
        let re = Regex::new(pattern).map_err(|e| ChannelError::Pattern {
            pattern: pattern.to_string(),
            detail: e.to_string(),
        })?;
        self.drain_raw()?;
        if let Some(m) = re.find(&self.pending) {
            let end = m.end();
            return Ok(self.pending.drain(..end).collect());
        }
        if self.closed {
            return Err(ChannelError::Eof {
                detail: "channel closed".into(),
                buffer: std::mem::take(&mut self.pending),
            });
        }
        Err(ChannelError::Timeout {
            pattern: pattern.to_string(),
            timeout,
            buffer: self.pending.clone(),
        })
    }

    fn clear_buffer(&mut self) {
        self.ops.push(ChannelOp::ClearBuffer);
        self.pending.clear();
        self.raw.clear();
        if let Some(text) = self.after_clear.pop_front() {
            self.pending.push_str(&text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[test]
    fn expect_consumes_through_match() {
        let mut chan = ScriptedChannel::new();
        chan.feed("noise\nlogin: root\n# ");
        let matched = chan.expect("login:", T).unwrap();
        assert_eq!(matched, "noise\nlogin:");
        let rest = chan.expect("# ", T).unwrap();
        assert_eq!(rest, " root\n# ");
    }

    #[test]
    fn unmatched_expect_times_out_with_buffer() {
        let mut chan = ScriptedChannel::new();
        chan.feed("kernel panic");
        let err = chan.expect("# ", T).unwrap_err();
        match err {
            ChannelError::Timeout { buffer, .. } => assert_eq!(buffer, "kernel panic"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn closed_channel_raises_eof() {
        let mut chan = ScriptedChannel::new();
        chan.close();
        assert!(matches!(
            chan.expect("# ", T),
            Err(ChannelError::Eof { .. })
        ));
    }

    #[test]
    fn raw_feed_exercises_decode_faults() {
        let mut chan = ScriptedChannel::new();
        chan.feed_raw(b"ok\xffbad");
        assert!(matches!(
            chan.expect("ok", T),
            Err(ChannelError::Decode { .. })
        ));
    }

    #[test]
    fn after_clear_feed_appears_once_the_buffer_is_cleared() {
        let mut chan = ScriptedChannel::new();
        chan.feed("stale noise");
        chan.feed_after_clear("fresh boot banner\nboot> ");
        chan.clear_buffer();
        let matched = chan.expect("boot> ", T).unwrap();
        assert!(matched.starts_with("fresh boot banner"));
    }

    #[test]
    fn operations_are_recorded_in_order() {
        let mut chan = ScriptedChannel::new();
        chan.feed("# ");
        chan.write(b"reboot\n").unwrap();
        chan.clear_buffer();
        chan.feed("# ");
        chan.expect("# ", T).unwrap();
        assert_eq!(
            chan.ops(),
            &[
                ChannelOp::Write(b"reboot\n".to_vec()),
                ChannelOp::ClearBuffer,
                ChannelOp::Expect("# ".to_string()),
            ]
        );
        assert_eq!(chan.written(), b"reboot\n");
        assert_eq!(chan.clear_count(), 1);
    }
}
