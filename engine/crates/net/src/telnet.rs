const IAC: u8 = 255;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;
const SB: u8 = 250;
const SE: u8 = 240;

pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Where the decoder is inside a Telnet command sequence. Kept across reads so
/// a sequence split over two packets is still removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Option,
    Sub,
    SubIac,
}

/// Turns raw Telnet bytes into text lines.
///
/// IAC sequences are removed, lines split on LF, CR is ignored, and bytes past
/// `max_len` on one line are dropped. Lines are decoded as lossy UTF-8.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    state: State,
    max_len: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            state: State::Data,
            max_len: max_len.max(1),
        }
    }

    /// Feed raw data into the buffer. Returns any complete lines.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in data {
            self.state = match (self.state, byte) {
                (State::Data, IAC) => State::Iac,
                (State::Data, b'\n') => {
                    lines.push(self.take_line());
                    State::Data
                }
                (State::Data, b'\r') => State::Data,
                (State::Data, b) => {
                    self.push_byte(b);
                    State::Data
                }
                (State::Iac, IAC) => {
                    // Escaped literal 255.
                    self.push_byte(IAC);
                    State::Data
                }
                (State::Iac, WILL | WONT | DO | DONT) => State::Option,
                (State::Iac, SB) => State::Sub,
                (State::Iac, _) => State::Data,
                (State::Option, _) => State::Data,
                (State::Sub, IAC) => State::SubIac,
                (State::Sub, _) => State::Sub,
                (State::SubIac, SE) => State::Data,
                (State::SubIac, _) => State::Sub,
            };
        }
        lines
    }

    /// Take whatever partial line is buffered (used at end of stream).
    pub fn finish(&mut self) -> Option<String> {
        self.state = State::Data;
        if self.buf.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if self.buf.len() < self.max_len {
            self.buf.push(byte);
        }
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buf);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
