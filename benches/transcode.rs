use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reasonify_rs::config::AppConfig;
use reasonify_rs::protocol::parse_proxy_request;
use reasonify_rs::protocol::response::translate;
use reasonify_rs::protocol::upstream::{build_upstream_request, UpstreamOptions};
use reasonify_rs::stream::StreamTranscoder;

fn sample_request_body(messages: usize, message_len: usize) -> Vec<u8> {
    let content = "x".repeat(message_len);
    let messages: Vec<serde_json::Value> = (0..messages)
        .map(|index| {
            let role = if index % 2 == 0 { "user" } else { "assistant" };
            serde_json::json!({"role": role, "content": content})
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({
        "model": "gpt-4o",
        "stream": true,
        "messages": messages,
    }))
    .expect("request body")
}

fn reasoning_frame(text: &str) -> String {
    format!(
        "data: {{\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"created\":1727000000,\"model\":\"qwen3-32b\",\"choices\":[{{\"index\":0,\"delta\":{{\"reasoning_content\":\"{text}\"}},\"finish_reason\":null}}]}}\n\n"
    )
}

fn answer_frame(text: &str) -> String {
    format!(
        "data: {{\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"created\":1727000000,\"model\":\"qwen3-32b\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{text}\"}},\"finish_reason\":null}}]}}\n\n"
    )
}

/// A realistic reasoning stream: many reasoning fragments, then the answer,
/// then `[DONE]`.
fn sample_stream(reasoning_frames: usize, answer_frames: usize) -> Bytes {
    let mut stream = String::new();
    for index in 0..reasoning_frames {
        stream.push_str(&reasoning_frame(&format!("step {index} ")));
    }
    for index in 0..answer_frames {
        stream.push_str(&answer_frame(&format!("word{index} ")));
    }
    stream.push_str("data: [DONE]\n\n");
    Bytes::from(stream)
}

fn bench_request(c: &mut Criterion) {
    let config = AppConfig::with_upstream("http://localhost:9000/v1", "k");
    let options = UpstreamOptions::from_config(&config);

    for (name, messages, len) in [("small", 2, 64), ("large_50msg_2k", 50, 2048)] {
        let body = sample_request_body(messages, len);
        c.bench_function(&format!("request_transcode_{name}"), |b| {
            b.iter(|| {
                let request = parse_proxy_request(black_box(&body)).expect("parse");
                let upstream = build_upstream_request(&request, "qwen3-235b-a22b", &options, true);
                black_box(serde_json::to_vec(&upstream).expect("encode"))
            });
        });
    }
}

fn bench_non_stream(c: &mut Criterion) {
    let body = serde_json::to_vec(&serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_727_000_000_u64,
        "model": "qwen3-32b",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "reasoning_content": "thinking ".repeat(500),
                "content": "answer ".repeat(200),
            },
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 900, "total_tokens": 912}
    }))
    .expect("completion body");

    c.bench_function("non_stream_translate", |b| {
        b.iter(|| black_box(translate(black_box(&body), "gpt-4o", "chatcmpl-x", true)));
    });
}

fn bench_stream(c: &mut Criterion) {
    let stream = sample_stream(200, 100);

    for (name, chunk_size) in [("whole", usize::MAX), ("net_1k", 1024), ("tiny_7b", 7)] {
        c.bench_function(&format!("stream_transcode_{name}"), |b| {
            b.iter(|| {
                let mut transcoder = StreamTranscoder::new(true);
                let mut out = Vec::with_capacity(8);
                let mut produced = 0usize;
                for chunk in stream.chunks(chunk_size.min(stream.len())) {
                    transcoder.push(black_box(chunk), &mut out);
                    produced += out.len();
                    out.clear();
                }
                transcoder.finish(&mut out);
                black_box(produced + out.len())
            });
        });
    }

    c.bench_function("stream_transcode_hidden_reasoning", |b| {
        b.iter(|| {
            let mut transcoder = StreamTranscoder::new(false);
            let mut out = Vec::with_capacity(8);
            transcoder.push(black_box(&stream), &mut out);
            black_box(out.len())
        });
    });
}

criterion_group!(benches, bench_request, bench_non_stream, bench_stream);
criterion_main!(benches);
