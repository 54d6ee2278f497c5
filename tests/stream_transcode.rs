use bytes::Bytes;
use futures_util::StreamExt;
use reasonify_rs::stream::{transcode_stream, Phase, StreamTranscoder, TranscodeOptions};
use serde_json::Value;

const REASONING_STREAM: &str = concat!(
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"qwen3-32b\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"reasoning_content\":\"Let me \"}}]}\n\n",
    ": keep-alive\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"qwen3-32b\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"think \\u00e9\"}}]}\r\n\r\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"qwen3-32b\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\",\"reasoning_content\":null}}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"qwen3-32b\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\" there\"}}]}\n\n",
    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"qwen3-32b\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
);

fn transcode_in_chunks(input: &[u8], chunk_size: usize, show_reasoning: bool) -> String {
    let mut transcoder = StreamTranscoder::new(show_reasoning);
    let mut out = Vec::new();
    for chunk in input.chunks(chunk_size) {
        transcoder.push(chunk, &mut out);
    }
    transcoder.finish(&mut out);
    String::from_utf8(out.concat()).expect("utf8 output")
}

fn data_payloads(output: &str) -> Vec<&str> {
    output
        .split_inclusive('\n')
        .filter_map(|line| line.trim_end().strip_prefix("data: "))
        .collect()
}

fn content_text(output: &str) -> String {
    data_payloads(output)
        .into_iter()
        .filter(|payload| *payload != "[DONE]")
        .map(|payload| {
            let chunk: Value = serde_json::from_str(payload).expect("chunk json");
            chunk["choices"][0]["delta"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

#[test]
fn test_output_independent_of_chunking() {
    let whole = transcode_in_chunks(REASONING_STREAM.as_bytes(), usize::MAX, true);
    for chunk_size in [1, 2, 3, 5, 7, 13, 64, 257] {
        assert_eq!(
            transcode_in_chunks(REASONING_STREAM.as_bytes(), chunk_size, true),
            whole,
            "chunk size {chunk_size}"
        );
    }
}

#[test]
fn test_reasoning_folded_with_balanced_delimiters() {
    let output = transcode_in_chunks(REASONING_STREAM.as_bytes(), usize::MAX, true);

    assert!(!output.contains("reasoning_content"));
    assert!(!output.contains("keep-alive"));
    assert!(output.ends_with("data: [DONE]\n\n"));
    assert_eq!(
        content_text(&output),
        "<think>\nLet me think \u{e9}</think>\n\nHello there"
    );
    assert!(output.contains("\r\n\r\n"));
}

#[test]
fn test_hidden_reasoning_keeps_only_answer() {
    let output = transcode_in_chunks(REASONING_STREAM.as_bytes(), 11, false);
    assert!(!output.contains("reasoning_content"));
    assert!(!output.contains("<think>"));
    assert_eq!(content_text(&output), "Hello there");
}

#[test]
fn test_plain_stream_forwarded_byte_for_byte() {
    let plain = concat!(
        "data: {\"id\":\"c2\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n",
        "data: {\"id\":\"c2\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"b\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    assert_eq!(transcode_in_chunks(plain.as_bytes(), 4, true), plain);
}

#[test]
fn test_truncated_stream_closes_every_open_choice() {
    let input = concat!(
        "data: {\"id\":\"c3\",\"choices\":[",
        "{\"index\":0,\"delta\":{\"reasoning_content\":\"a\"}},",
        "{\"index\":1,\"delta\":{\"reasoning_content\":\"b\"}}]}\n\n",
    );
    let output = transcode_in_chunks(input.as_bytes(), 9, true);
    assert_eq!(output.matches("<think>").count(), 2);
    assert_eq!(output.matches("</think>").count(), 2);

    let closing: Vec<u64> = data_payloads(&output)[1..]
        .iter()
        .map(|payload| {
            let chunk: Value = serde_json::from_str(payload).expect("chunk json");
            assert_eq!(chunk["id"], "c3");
            chunk["choices"][0]["index"].as_u64().expect("index")
        })
        .collect();
    assert_eq!(closing, vec![0, 1]);
}

#[test]
fn test_phase_walk() {
    let mut transcoder = StreamTranscoder::new(true);
    let mut out = Vec::new();
    assert_eq!(transcoder.phase(), Phase::Idle);
    transcoder.push(b"data: {\"choices\":[]}\n\n", &mut out);
    assert_eq!(transcoder.phase(), Phase::Streaming);
    transcoder.push(b"data: [DONE]\n\n", &mut out);
    assert_eq!(transcoder.phase(), Phase::Closed);
    assert_eq!(transcoder.stats().frames, 2);
}

#[tokio::test]
async fn test_stream_adapter_closes_segment_before_error() {
    let upstream = futures_util::stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from_static(
            b"data: {\"id\":\"c4\",\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n\n",
        )),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer went away",
        )),
    ]);
    let options = TranscodeOptions {
        show_reasoning: true,
        idle_timeout: None,
        request_id: uuid::Uuid::nil(),
    };

    let chunks: Vec<Bytes> = transcode_stream(upstream, options)
        .map(|item| match item {
            Ok(bytes) => bytes,
            Err(never) => match never {},
        })
        .collect()
        .await;
    let output = String::from_utf8(chunks.concat()).expect("utf8");
    let payloads = data_payloads(&output);
    assert_eq!(payloads.len(), 3);

    let close: Value = serde_json::from_str(payloads[1]).expect("close chunk");
    assert_eq!(close["choices"][0]["delta"]["content"], "</think>\n\n");
    let error: Value = serde_json::from_str(payloads[2]).expect("error chunk");
    assert_eq!(error["error"]["code"], "upstream_stream_error");
    assert!(error["error"]["message"]
        .as_str()
        .expect("message")
        .contains("peer went away"));
}
