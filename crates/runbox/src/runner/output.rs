//! Bounded capture of program output

/// Appended to a stream that exceeded the cap
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Byte buffer that keeps at most `cap` bytes and remembers whether more
/// arrived
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap,
            truncated: false,
        }
    }

    /// Append bytes, dropping whatever goes past the cap
    pub fn push(&mut self, bytes: &[u8]) {
        let room = self.cap.saturating_sub(self.data.len());
        if bytes.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Decode the captured bytes, appending the marker if anything was cut
    pub fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}
