//! Wire decoder for the newline-delimited sample protocol.
//!
//! Each line carries one sample in one of two forms:
//! - JSON object: `{"timestamp": 1.5, "value": 0.25, "channel": 2}` where
//!   `channel` is optional and defaults to 0
//! - delimited text: `1.5,0.25,2` (whitespace-trimmed, channel optional)
//!
//! Lines matching neither form are dropped silently. Malformed input is
//! routine noise on real streams, not an error condition.

use crate::types::Sample;

/// Incremental line decoder with a persistent partial-line buffer.
///
/// Bytes arrive in arbitrary chunks; anything after the last `\n` is retained
/// until the next chunk completes the line. One decoder instance serves one
/// connection, so a fragment can never leak across a reconnect.
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            partial: Vec::with_capacity(256),
        }
    }

    /// Append a chunk and extract every complete line it finishes.
    ///
    /// Returns the samples parsed from those lines, in wire order. Unparseable
    /// lines contribute nothing.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Sample> {
        self.partial.extend_from_slice(chunk);

        let mut samples = Vec::new();
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            if let Some(sample) = parse_line(&line[..line.len() - 1]) {
                samples.push(sample);
            }
        }
        samples
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Drop any buffered fragment. Called when a connection goes away so
    /// stale bytes are not prepended to the next peer's data.
    pub fn reset(&mut self) {
        self.partial.clear();
    }
}

/// Parse one terminator-stripped line, JSON form first, delimited second.
fn parse_line(raw: &[u8]) -> Option<Sample> {
    let text = std::str::from_utf8(raw).ok()?.trim();
    if text.is_empty() {
        return None;
    }

    // Serde enforces the structured contract: numeric timestamp and value
    // required, integer channel optional.
    if let Ok(sample) = serde_json::from_str::<Sample>(text) {
        return Some(sample);
    }

    parse_delimited(text)
}

fn parse_delimited(text: &str) -> Option<Sample> {
    let mut fields = text.split(',');

    let timestamp: f64 = fields.next()?.trim().parse().ok()?;
    let value: f32 = fields.next()?.trim().parse().ok()?;
    // A present-but-garbled channel falls back to 0 rather than invalidating
    // an otherwise good sample.
    let channel: i32 = fields
        .next()
        .and_then(|f| f.trim().parse().ok())
        .unwrap_or(0);

    Some(Sample::new(timestamp, value, channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_round_trip() {
        let mut decoder = LineDecoder::new();
        let original = Sample::new(12.375, -0.5, 3);
        let wire = format!(
            "{},{},{}\n",
            original.timestamp, original.value, original.channel
        );

        let samples = decoder.feed(wire.as_bytes());
        assert_eq!(samples, vec![original]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn json_form() {
        let mut decoder = LineDecoder::new();
        let samples = decoder.feed(b"{\"timestamp\": 1.5, \"value\": 2.25, \"channel\": 7}\n");
        assert_eq!(samples, vec![Sample::new(1.5, 2.25, 7)]);
    }

    #[test]
    fn json_channel_defaults_to_zero() {
        let mut decoder = LineDecoder::new();
        let samples = decoder.feed(b"{\"timestamp\": 1.0, \"value\": 2.0}\n");
        assert_eq!(samples, vec![Sample::new(1.0, 2.0, 0)]);
    }

    #[test]
    fn json_takes_precedence_over_comma_splitting() {
        // The line contains commas but is a valid structured message; it must
        // go through the JSON path, not be split on commas.
        let mut decoder = LineDecoder::new();
        let samples = decoder.feed(b"{\"timestamp\": 3.0, \"value\": 4.0, \"channel\": 1}\n");
        assert_eq!(samples, vec![Sample::new(3.0, 4.0, 1)]);
    }

    #[test]
    fn delimited_channel_optional() {
        let mut decoder = LineDecoder::new();
        let samples = decoder.feed(b"1.0,2.5\n");
        assert_eq!(samples, vec![Sample::new(1.0, 2.5, 0)]);
    }

    #[test]
    fn whitespace_is_trimmed() {
        let mut decoder = LineDecoder::new();
        let samples = decoder.feed(b"  1.0 , 2.5 , 4 \r\n");
        assert_eq!(samples, vec![Sample::new(1.0, 2.5, 4)]);
    }

    #[test]
    fn partial_chunk_reassembly() {
        let mut decoder = LineDecoder::new();

        let first = decoder.feed(b"1.0,2.5,0");
        assert!(first.is_empty());
        assert_eq!(decoder.pending(), 9);

        let second = decoder.feed(b"\n3.0,4.5,1\n");
        assert_eq!(
            second,
            vec![Sample::new(1.0, 2.5, 0), Sample::new(3.0, 4.5, 1)]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn malformed_lines_are_dropped_silently() {
        let mut decoder = LineDecoder::new();
        let samples = decoder.feed(b"garbage\n1.0,2.0\n\n");
        assert_eq!(samples, vec![Sample::new(1.0, 2.0, 0)]);
    }

    #[test]
    fn non_numeric_required_fields_drop_the_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"abc,2.0\n").is_empty());
        assert!(decoder.feed(b"1.0,xyz\n").is_empty());
        assert!(decoder.feed(b"{\"timestamp\": \"abc\", \"value\": 2.0}\n").is_empty());
    }

    #[test]
    fn single_field_line_is_dropped() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"5\n").is_empty());
    }

    #[test]
    fn multiple_lines_in_one_chunk_keep_order() {
        let mut decoder = LineDecoder::new();
        let samples = decoder.feed(b"1.0,1.0\n2.0,2.0\n3.0,3.0\n");
        let timestamps: Vec<f64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn reset_discards_the_fragment() {
        let mut decoder = LineDecoder::new();
        decoder.feed(b"1.0,2.");
        decoder.reset();

        // The leftover "1.0,2." must not combine with post-reset bytes.
        let samples = decoder.feed(b"5\n");
        assert!(samples.is_empty());
    }
}
