use serde::Deserialize;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// One `data:` payload from the completion stream. Only
/// `choices[0].delta.content` is interesting; everything else is ignored.
#[derive(Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Reassembles newline-delimited SSE frames from arbitrarily chunked bytes
/// and extracts the text deltas they carry.
///
/// The buffer holds raw bytes: a multi-byte character split across chunk
/// boundaries stays buffered until its line completes, so decoding is
/// stateful rather than per-chunk.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the response body. Returns the deltas completed by
    /// this chunk, in arrival order. The trailing fragment after the last
    /// newline is retained for the next call; it is never treated as a
    /// complete line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(delta) = extract_delta(&line[..line.len() - 1]) {
                deltas.push(delta);
            }
        }
        deltas
    }
}

/// Decode one complete line. Returns `None` for anything that is not a
/// non-empty content delta: blank lines, comment/event lines, the `[DONE]`
/// sentinel, unparseable JSON, and payloads without
/// `choices[0].delta.content`. Heartbeat and malformed lines are skipped,
/// never fatal to the stream.
fn extract_delta(line: &[u8]) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?;
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_MARKER {
        return None;
    }

    let parsed: StreamPayload = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!(%err, "skipping unparseable stream line");
            return None;
        }
    };

    parsed
        .choices
        .into_iter()
        .next()?
        .delta?
        .content
        .filter(|content| !content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n",
            content
        )
    }

    fn decode_all(decoder: &mut SseDecoder, chunks: &[&[u8]]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|chunk| decoder.push(chunk))
            .collect()
    }

    #[test]
    fn extracts_deltas_in_order() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}data: [DONE]\n", data_line("Hel"), data_line("lo"));
        let deltas = decoder.push(input.as_bytes());
        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[test]
    fn chunk_boundary_inside_prefix() {
        let mut decoder = SseDecoder::new();
        let line = data_line("Hi");
        let (a, b) = line.as_bytes().split_at(3); // "dat" | "a: ..."
        let deltas = decode_all(&mut decoder, &[a, b]);
        assert_eq!(deltas, vec!["Hi"]);
    }

    #[test]
    fn chunk_boundary_inside_json() {
        // Prefix plus partial JSON, the rest of the JSON, then the sentinel.
        let mut decoder = SseDecoder::new();
        let deltas = decode_all(
            &mut decoder,
            &[
                b"data: {\"choices\":[{\"delta\":".as_slice(),
                b"{\"content\":\"Hi\"}}]}\n".as_slice(),
                b"data: [DONE]\n".as_slice(),
            ],
        );
        assert_eq!(deltas, vec!["Hi"]);
    }

    #[test]
    fn chunk_boundary_inside_multibyte_character() {
        let mut decoder = SseDecoder::new();
        let line = data_line("caf\\u00e9 \u{2603}"); // escaped é plus a raw snowman
        let bytes = line.as_bytes();
        // Split in the middle of the three-byte snowman.
        let snowman_start = line.find('\u{2603}').unwrap();
        let (a, b) = bytes.split_at(snowman_start + 1);
        let deltas = decode_all(&mut decoder, &[a, b]);
        assert_eq!(deltas, vec!["café \u{2603}"]);
    }

    #[test]
    fn every_split_point_yields_the_same_deltas() {
        let input = format!(
            "{}{}data: [DONE]\n{}",
            data_line("a\u{00e9}"),
            data_line("b"),
            data_line("c")
        );
        let bytes = input.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = SseDecoder::new();
            let (first, second) = bytes.split_at(split);
            let deltas = decode_all(&mut decoder, &[first, second]);
            assert_eq!(deltas, vec!["a\u{00e9}", "b", "c"], "split at {split}");
        }
    }

    #[test]
    fn done_marker_contributes_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]\n").is_empty());
        // Decoding continues normally afterwards.
        assert_eq!(decoder.push(data_line("x").as_bytes()), vec!["x"]);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let mut decoder = SseDecoder::new();
        let input = format!(
            "data: {{not json\n{}data: {{\"choices\":[]}}\n{}",
            data_line("ok"),
            data_line("tail")
        );
        let deltas = decoder.push(input.as_bytes());
        assert_eq!(deltas, vec!["ok", "tail"]);
    }

    #[test]
    fn non_data_lines_are_discarded() {
        let mut decoder = SseDecoder::new();
        let input = format!(
            ": keep-alive\n\nevent: message\n{}",
            data_line("only")
        );
        let deltas = decoder.push(input.as_bytes());
        assert_eq!(deltas, vec!["only"]);
    }

    #[test]
    fn missing_or_empty_content_is_skipped() {
        let mut decoder = SseDecoder::new();
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
        );
        assert!(decoder.push(input.as_bytes()).is_empty());
    }

    #[test]
    fn crlf_terminated_lines_decode() {
        let mut decoder = SseDecoder::new();
        let deltas = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\ndata: [DONE]\r\n",
        );
        assert_eq!(deltas, vec!["hi"]);
    }

    #[test]
    fn trailing_fragment_is_not_a_line() {
        let mut decoder = SseDecoder::new();
        // No newline yet: nothing may be emitted.
        assert!(decoder.push(data_line("hi").trim_end().as_bytes()).is_empty());
        // The newline completes the buffered line.
        assert_eq!(decoder.push(b"\n"), vec!["hi"]);
    }
}
