//! Streaming line assembly for the serial transport.
//!
//! Serial chunks arrive at arbitrary byte boundaries, so a message line may
//! span several reads. The framer accumulates chunks and yields only
//! complete newline-terminated lines, holding the trailing partial segment
//! until the rest of it arrives.

/// Assembles raw text chunks into complete lines.
///
/// Splits on `\n` and strips a trailing `\r` from each yielded line. The
/// segment after the last newline (possibly empty) stays buffered for the
/// next [`feed`](Self::feed) call, so no partial data is ever dropped.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return all lines completed by it, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// The retained partial line, if any.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Discard any buffered partial line. Called on disconnect.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.feed("SLOTS:3\nALIGNMENT:OK\n");
        assert_eq!(lines, vec!["SLOTS:3", "ALIGNMENT:OK"]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn retains_partial_line_across_chunks() {
        let mut framer = LineFramer::new();
        let lines = framer.feed("SLOTS:3\nALIGNM");
        assert_eq!(lines, vec!["SLOTS:3"]);
        assert_eq!(framer.pending(), "ALIGNM");

        let lines = framer.feed("ENT:OK\nOCCUPIED:2\n");
        assert_eq!(lines, vec!["ALIGNMENT:OK", "OCCUPIED:2"]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn strips_carriage_returns() {
        let mut framer = LineFramer::new();
        let lines = framer.feed("SLOTS:2\r\nRELEASED:1\r\n");
        assert_eq!(lines, vec!["SLOTS:2", "RELEASED:1"]);
    }

    #[test]
    fn empty_lines_are_preserved() {
        let mut framer = LineFramer::new();
        let lines = framer.feed("\n\nSLOTS:1\n");
        assert_eq!(lines, vec!["", "", "SLOTS:1"]);
    }

    #[test]
    fn framing_is_lossless() {
        // Concatenating yielded lines (with their newlines) plus the
        // retained buffer must reconstruct the input exactly.
        let chunks = ["SLO", "TS:3\nALIGNMENT:O", "K\nOCC", "UPIED:2\nRELE"];
        let mut framer = LineFramer::new();
        let mut reconstructed = String::new();
        for chunk in chunks {
            for line in framer.feed(chunk) {
                reconstructed.push_str(&line);
                reconstructed.push('\n');
            }
        }
        reconstructed.push_str(framer.pending());
        assert_eq!(reconstructed, chunks.concat());
    }

    #[test]
    fn reset_discards_buffer() {
        let mut framer = LineFramer::new();
        framer.feed("SLOTS");
        framer.reset();
        assert_eq!(framer.pending(), "");
        // A later chunk must not be glued to the discarded fragment.
        let lines = framer.feed(":3\n");
        assert_eq!(lines, vec![":3"]);
    }
}
