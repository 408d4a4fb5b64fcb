//! Newline framing for raw transport bytes
//!
//! Buffers input and emits a line whenever `\n` is seen. A `\r` directly
//! before the `\n` is stripped. Bytes of an unfinished line are kept until
//! the next push, so a line split across reads is reassembled intact.

/// Incremental byte-to-line decoder
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Feed bytes, returning every line completed by them in arrival order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                if self.buffer.last() == Some(&b'\r') {
                    self.buffer.pop();
                }
                lines.push(String::from_utf8_lossy(&self.buffer).into_owned());
                self.buffer.clear();
            } else {
                self.buffer.push(b);
            }
        }

        lines
    }

    /// Bytes of the unfinished line
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
