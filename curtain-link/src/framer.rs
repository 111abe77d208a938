use std::io::{self, Read};

/// Lines longer than this without a terminator are treated as noise.
pub const MAX_LINE_LENGTH: usize = 4096;

const READ_CHUNK: usize = 256;

/// Splits a byte stream into trimmed text lines.
///
/// A read that times out is not an error: [`LineFramer::next_line`] returns
/// `Ok(None)` so the caller can check for shutdown and poll again. Partial
/// lines are kept across calls until their `\n` arrives.
pub struct LineFramer<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: Read> LineFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Returns the next non-empty line, `Ok(None)` on read timeout, or the
    /// underlying transport error.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=end).collect();
                let line = clean_line(&raw[..end]);

                if !line.is_empty() {
                    return Ok(Some(line));
                }
            }

            if self.buffer.len() > MAX_LINE_LENGTH {
                tracing::warn!("discarding {} unterminated bytes", self.buffer.len());
                self.buffer.clear();
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial stream closed",
                    ));
                }
                Ok(count) => self.buffer.extend_from_slice(&chunk[..count]),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    return Ok(None);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Decodes permissively: invalid UTF-8 and control characters are dropped.
pub fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
