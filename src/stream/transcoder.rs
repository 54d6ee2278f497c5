use bytes::Bytes;
use serde_json::{Map, Value};

use super::delta::{rewrite_chunk, ChunkRewrite, OpenSegments};
use super::frame::{encode_data_frame, is_done_payload, FrameReassembler, RawFrame, LF_TERMINATOR};
use crate::error::{format_error, ProxyError};
use crate::protocol::think::THINK_CLOSE_STREAM;

const ENVELOPE_KEYS: [&str; 4] = ["id", "object", "created", "model"];
const CHUNK_OBJECT: &str = "chat.completion.chunk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Streaming,
    Closed,
}

/// Counters reported when a stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    pub frames: u64,
    pub rewritten: u64,
    pub passthrough_malformed: u64,
    pub delimiters_closed: u64,
}

/// Per-request rewriter from the upstream SSE byte stream to the caller's.
///
/// Reasoning fragments are folded into `delta.content` between think
/// delimiters. Every opened segment is closed, by an answer fragment, by the
/// `[DONE]` frame, or at end of stream. Frames that cannot be parsed or
/// re-encoded are forwarded untouched.
#[derive(Debug)]
pub struct StreamTranscoder {
    reassembler: FrameReassembler,
    open: OpenSegments,
    envelope: Map<String, Value>,
    phase: Phase,
    show_reasoning: bool,
    stats: TranscodeStats,
}

impl StreamTranscoder {
    #[must_use]
    pub fn new(show_reasoning: bool) -> Self {
        Self {
            reassembler: FrameReassembler::new(),
            open: OpenSegments::default(),
            envelope: Map::new(),
            phase: Phase::Idle,
            show_reasoning,
            stats: TranscodeStats::default(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    #[must_use]
    pub fn stats(&self) -> TranscodeStats {
        self.stats
    }

    /// Feed upstream bytes, appending every frame ready for the caller to
    /// `out`. Input after the stream closed is ignored.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<Bytes>) {
        match self.phase {
            Phase::Closed => return,
            Phase::Idle if !chunk.is_empty() => self.phase = Phase::Streaming,
            Phase::Idle | Phase::Streaming => {}
        }
        self.reassembler.push(chunk);
        while let Some(frame) = self.reassembler.next_frame() {
            self.process_frame(frame, out);
            if self.is_closed() {
                return;
            }
        }
    }

    /// Upstream closed without `[DONE]`: process any trailing frame, then
    /// close open reasoning segments.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) {
        if self.is_closed() {
            return;
        }
        if let Some(tail) = self.reassembler.take_residual() {
            let frame = RawFrame::from_tail(&tail);
            if frame.data().is_some() {
                self.process_frame(frame, out);
                if self.is_closed() {
                    return;
                }
            }
        }
        self.close_open_segments(LF_TERMINATOR, out);
        self.phase = Phase::Closed;
    }

    /// Upstream failed mid-stream: close open reasoning segments and report
    /// the failure in-band.
    pub fn fail(&mut self, message: &str, out: &mut Vec<Bytes>) {
        if self.is_closed() {
            return;
        }
        self.reassembler.take_residual();
        self.close_open_segments(LF_TERMINATOR, out);
        let (_, body) = format_error(&ProxyError::StreamTransport(message.to_owned()));
        out.push(encode_data_frame(body.to_string().as_bytes(), LF_TERMINATOR));
        self.phase = Phase::Closed;
    }

    fn process_frame(&mut self, frame: RawFrame, out: &mut Vec<Bytes>) {
        let parsed = {
            let Some(data) = frame.data() else {
                return;
            };
            (!is_done_payload(&data)).then(|| serde_json::from_slice::<Value>(&data))
        };
        self.stats.frames += 1;

        let chunk = match parsed {
            None => {
                self.close_open_segments(frame.terminator(), out);
                out.push(frame.into_bytes());
                self.phase = Phase::Closed;
                return;
            }
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "forwarding unparseable stream frame as received");
                self.stats.passthrough_malformed += 1;
                out.push(frame.into_bytes());
                return;
            }
        };
        self.remember_envelope(&chunk);

        match rewrite_chunk(chunk, &self.open, self.show_reasoning) {
            ChunkRewrite::Unchanged => out.push(frame.into_bytes()),
            ChunkRewrite::Rewritten { chunk, open } => match serde_json::to_vec(&chunk) {
                Ok(json) => {
                    self.open = open;
                    self.stats.rewritten += 1;
                    out.push(encode_data_frame(&json, frame.terminator()));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to re-encode stream frame; forwarding original");
                    out.push(frame.into_bytes());
                }
            },
        }
    }

    fn remember_envelope(&mut self, chunk: &Value) {
        let Some(object) = chunk.as_object() else {
            return;
        };
        for key in ENVELOPE_KEYS {
            if let Some(value) = object.get(key) {
                self.envelope.insert(key.to_string(), value.clone());
            }
        }
    }

    fn close_open_segments(&mut self, terminator: &[u8], out: &mut Vec<Bytes>) {
        for choice_index in self.open.take_sorted() {
            let chunk = self.close_chunk(choice_index);
            out.push(encode_data_frame(chunk.to_string().as_bytes(), terminator));
            self.stats.delimiters_closed += 1;
        }
    }

    fn close_chunk(&self, choice_index: u32) -> Value {
        let mut chunk = self.envelope.clone();
        chunk
            .entry("object")
            .or_insert_with(|| Value::String(CHUNK_OBJECT.to_string()));
        chunk.insert(
            "choices".to_string(),
            serde_json::json!([{
                "index": choice_index,
                "delta": {"content": THINK_CLOSE_STREAM},
                "finish_reason": null,
            }]),
        );
        Value::Object(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(transcoder: &mut StreamTranscoder, input: &[u8]) -> String {
        let mut out = Vec::new();
        transcoder.push(input, &mut out);
        String::from_utf8(out.concat()).unwrap()
    }

    #[test]
    fn test_starts_idle_and_streams_on_first_bytes() {
        let mut transcoder = StreamTranscoder::new(true);
        assert_eq!(transcoder.phase(), Phase::Idle);
        run(&mut transcoder, b"");
        assert_eq!(transcoder.phase(), Phase::Idle);
        run(&mut transcoder, b"data: {");
        assert_eq!(transcoder.phase(), Phase::Streaming);
    }

    #[test]
    fn test_done_closes_open_segment_first() {
        let mut transcoder = StreamTranscoder::new(true);
        let output = run(
            &mut transcoder,
            b"data: {\"id\":\"c1\",\"created\":7,\"model\":\"qwen3-32b\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"r\"}}]}\n\ndata: [DONE]\n\n",
        );
        let frames: Vec<&str> = output.split_inclusive("\n\n").collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].contains("<think>\\nr"));
        let close: Value =
            serde_json::from_str(frames[1].trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(close["id"], "c1");
        assert_eq!(close["created"], 7);
        assert_eq!(close["model"], "qwen3-32b");
        assert_eq!(close["object"], "chat.completion.chunk");
        assert_eq!(close["choices"][0]["delta"]["content"], "</think>\n\n");
        assert_eq!(frames[2], "data: [DONE]\n\n");
        assert!(transcoder.is_closed());
        assert_eq!(transcoder.stats().delimiters_closed, 1);
    }

    #[test]
    fn test_input_after_done_ignored() {
        let mut transcoder = StreamTranscoder::new(true);
        run(&mut transcoder, b"data: [DONE]\n\n");
        assert_eq!(run(&mut transcoder, b"data: {}\n\n"), "");
        let mut out = Vec::new();
        transcoder.finish(&mut out);
        transcoder.fail("late", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_done_keeps_crlf_terminator() {
        let mut transcoder = StreamTranscoder::new(true);
        let output = run(
            &mut transcoder,
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"r\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n",
        );
        let frames: Vec<&str> = output.split_inclusive("\r\n\r\n").collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], "data: [DONE]\r\n\r\n");
    }

    #[test]
    fn test_malformed_frame_forwarded_verbatim() {
        let mut transcoder = StreamTranscoder::new(true);
        assert_eq!(
            run(&mut transcoder, b"data: {not json\n\n"),
            "data: {not json\n\n"
        );
        assert_eq!(transcoder.stats().passthrough_malformed, 1);
    }

    #[test]
    fn test_malformed_frame_keeps_open_segment() {
        let mut transcoder = StreamTranscoder::new(true);
        let mut out = Vec::new();
        transcoder.push(
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"r\"}}]}\n\n",
            &mut out,
        );
        transcoder.push(b"data: {bad\n\n", &mut out);
        transcoder.push(
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n",
            &mut out,
        );
        transcoder.finish(&mut out);

        assert_eq!(out.len(), 3);
        assert_eq!(out[1].as_ref(), b"data: {bad\n\n");
        let answer: Value =
            serde_json::from_slice(out[2].strip_prefix(b"data: ").unwrap().trim_ascii_end())
                .unwrap();
        assert_eq!(answer["choices"][0]["delta"]["content"], "</think>\n\na");
        let output = String::from_utf8(out.concat()).unwrap();
        assert_eq!(output.matches("</think>").count(), 1);
        assert_eq!(transcoder.stats().passthrough_malformed, 1);
        assert_eq!(transcoder.stats().delimiters_closed, 0);
    }

    #[test]
    fn test_non_data_segments_dropped() {
        let mut transcoder = StreamTranscoder::new(true);
        assert_eq!(run(&mut transcoder, b": keep-alive\n\n\n\nid: 3\n\n"), "");
        assert_eq!(transcoder.stats().frames, 0);
    }

    #[test]
    fn test_finish_processes_tail_and_closes() {
        let mut transcoder = StreamTranscoder::new(true);
        let mut out = Vec::new();
        transcoder.push(
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"a\"}}]}\n\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"b\"}}]}",
            &mut out,
        );
        assert_eq!(out.len(), 1);
        transcoder.finish(&mut out);
        let output = String::from_utf8(out.concat()).unwrap();
        assert_eq!(output.matches("<think>").count(), 1);
        assert_eq!(output.matches("</think>").count(), 1);
        assert!(output.ends_with("\n\n"));
        assert!(transcoder.is_closed());
    }

    #[test]
    fn test_fail_closes_then_reports() {
        let mut transcoder = StreamTranscoder::new(true);
        let mut out = Vec::new();
        transcoder.push(
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"a\"}}]}\n\n",
            &mut out,
        );
        transcoder.fail("connection reset", &mut out);
        assert_eq!(out.len(), 3);
        let error: Value = serde_json::from_slice(
            out[2]
                .strip_prefix(b"data: ")
                .unwrap()
                .trim_ascii_end(),
        )
        .unwrap();
        assert_eq!(error["error"]["type"], "stream_error");
        assert_eq!(error["error"]["code"], "upstream_stream_error");
        assert!(error["error"]["message"]
            .as_str()
            .unwrap()
            .contains("connection reset"));
        assert!(transcoder.is_closed());
    }
}
