//! Request server protocol tests
//!
//! Each test binds an ephemeral port and talks line-JSON over real sockets.

mod helpers;

use helpers::audio_generator::{generate_test_wav, AudioConfig};
use helpers::stub_model::StubModel;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use vasr_common::audio::read_audio;
use vasr_common::protocol::{ServerRequest, ServerResponse};
use vasr_enhance::model::DiffusionParams;
use vasr_enhance::pipeline::ChannelDispatcher;
use vasr_enhance::server::MAX_REQUEST_BYTES;
use vasr_enhance::{Backend, RequestServer, ServerClient, ServerContext};

async fn start(context: ServerContext, max_concurrent: Option<usize>) -> SocketAddr {
    let server = RequestServer::bind("127.0.0.1:0", context, max_concurrent)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn send_line(addr: SocketAddr, line: &str) -> ServerResponse {
    let mut bytes = line.as_bytes().to_vec();
    bytes.push(b'\n');
    send_bytes(addr, &bytes).await
}

async fn send_bytes(addr: SocketAddr, bytes: &[u8]) -> ServerResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader.read_line(&mut response).await.unwrap();
    assert!(response.ends_with('\n'));
    serde_json::from_str(&response).unwrap()
}

async fn send(addr: SocketAddr, input: &Path, output: &Path) -> ServerResponse {
    let request = ServerRequest::new(input.to_string_lossy(), output.to_string_lossy());
    send_line(addr, &serde_json::to_string(&request).unwrap()).await
}

fn model_context(scratch: &TempDir) -> ServerContext {
    let dispatcher = ChannelDispatcher::new(Arc::new(StubModel::upsampling()), DiffusionParams::default(), 0.25)
        .with_scratch_dir(scratch.path());
    ServerContext::new(Backend::Model(dispatcher), false)
}

fn mono_wav(dir: &Path, name: &str, seconds: f64) -> std::path::PathBuf {
    generate_test_wav(
        &dir.join(name),
        &AudioConfig {
            duration_seconds: seconds,
            sample_rate: 16000,
            channels: 1,
            constant: None,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_request_enhances_file() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let addr = start(model_context(&scratch), None).await;
    let input = mono_wav(dir.path(), "a.wav", 0.5);
    let output = dir.path().join("b.wav");

    let response = send(addr, &input, &output).await;

    assert_eq!(response.rc, 0, "stderr: {}", response.stderr);
    assert!(output.exists());
    assert_eq!(read_audio(&output).unwrap().frames(), 24000);
}

#[tokio::test]
async fn test_missing_output_is_rc5() {
    let scratch = TempDir::new().unwrap();
    let addr = start(model_context(&scratch), None).await;

    let response = send_line(addr, r#"{"input":"a.wav"}"#).await;

    assert_eq!(response.rc, 5);
    assert_eq!(response.stderr, "invalid request");
}

#[tokio::test]
async fn test_malformed_json_is_rc6() {
    let addr = start(ServerContext::new(Backend::Disabled, false), None).await;

    let response = send_line(addr, "{not json").await;

    assert_eq!(response.rc, 6);
    assert!(!response.stderr.is_empty());
}

#[tokio::test]
async fn test_invalid_utf8_is_rc6() {
    let addr = start(ServerContext::new(Backend::Disabled, false), None).await;

    let response = send_bytes(addr, b"{\"input\":\"\xff\xfe\",\"output\":\"b.wav\"}\n").await;

    assert_eq!(response.rc, 6);
    assert!(response.stderr.contains("utf-8"), "stderr: {}", response.stderr);
}

#[tokio::test]
async fn test_oversized_request_is_rc5() {
    let addr = start(ServerContext::new(Backend::Disabled, false), None).await;

    // One byte over the cap and no newline
    let response = send_bytes(addr, &vec![b'a'; MAX_REQUEST_BYTES + 1]).await;

    assert_eq!(response.rc, 5);
    assert_eq!(response.stderr, "request too large");

    let response = send_line(addr, r#"{"input":"a.wav","output":"b.wav"}"#).await;
    assert_eq!(response.rc, 9);
}

#[tokio::test]
async fn test_disabled_backend_is_rc9() {
    let addr = start(ServerContext::new(Backend::Disabled, false), None).await;

    let response = send_line(addr, r#"{"input":"a.wav","output":"b.wav"}"#).await;

    assert_eq!(response.rc, 9);
    assert_eq!(response.stderr, "enhancement disabled");
}

#[tokio::test]
async fn test_always_copy() {
    let dir = TempDir::new().unwrap();
    let addr = start(ServerContext::new(Backend::Disabled, true), None).await;
    let input = dir.path().join("a.wav");
    std::fs::write(&input, b"original").unwrap();
    let output = dir.path().join("copies").join("b.wav");

    let response = send(addr, &input, &output).await;
    assert_eq!(response.rc, 0);
    assert_eq!(response.stdout, "copied");
    assert_eq!(std::fs::read(&output).unwrap(), b"original");

    let response = send(addr, &dir.path().join("missing.wav"), &output).await;
    assert_eq!(response.rc, 7);
}

#[tokio::test]
async fn test_model_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let dispatcher = ChannelDispatcher::new(Arc::new(StubModel::out_of_memory()), DiffusionParams::default(), 0.25)
        .with_scratch_dir(scratch.path());
    let addr = start(ServerContext::new(Backend::Model(dispatcher), false), None).await;
    let input = mono_wav(dir.path(), "a.wav", 0.5);

    let response = send(addr, &input, &dir.path().join("b.wav")).await;

    assert_ne!(response.rc, 0);
    assert!(response.stderr.contains("resource exhausted"));
}

#[tokio::test]
async fn test_connection_closed_without_request() {
    let addr = start(ServerContext::new(Backend::Disabled, false), None).await;

    drop(TcpStream::connect(addr).await.unwrap());

    // The server keeps serving
    let response = send_line(addr, r#"{"input":"a.wav","output":"b.wav"}"#).await;
    assert_eq!(response.rc, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_cross_talk() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let addr = start(model_context(&scratch), None).await;

    let mut tasks = Vec::new();
    for i in 1..=6 {
        let input = mono_wav(dir.path(), &format!("in_{}.wav", i), 0.1 * i as f64);
        let output = dir.path().join(format!("out_{}.wav", i));
        tasks.push(tokio::spawn(async move {
            let response = send(addr, &input, &output).await;
            (i, output, response)
        }));
    }

    for task in tasks {
        let (i, output, response) = task.await.unwrap();
        assert_eq!(response.rc, 0, "request {}: {}", i, response.stderr);
        let frames = read_audio(&output).unwrap().frames();
        assert_eq!(frames, 4800 * i, "request {} got another request's audio", i);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_admission_gate_serves_every_request() {
    let dir = TempDir::new().unwrap();
    let addr = start(ServerContext::new(Backend::Disabled, true), Some(1)).await;

    let mut tasks = Vec::new();
    for i in 0..5 {
        let input = dir.path().join(format!("a{}.wav", i));
        std::fs::write(&input, format!("payload {}", i)).unwrap();
        let output = dir.path().join(format!("b{}.wav", i));
        tasks.push(tokio::spawn(async move { (i, output.clone(), send(addr, &input, &output).await) }));
    }

    for task in tasks {
        let (i, output, response) = task.await.unwrap();
        assert_eq!(response.rc, 0);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), format!("payload {}", i));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_client() {
    let addr = start(ServerContext::new(Backend::Disabled, false), None).await;

    let response = tokio::task::spawn_blocking(move || {
        ServerClient::new(addr.to_string())
            .with_timeout(Duration::from_secs(10))
            .send(&ServerRequest::new("a.wav", "b.wav"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(response.rc, 9);
}

#[cfg(unix)]
#[tokio::test]
async fn test_cli_backend_round_trip() {
    use helpers::fake_tools::{runner, sh_form};
    use vasr_enhance::external::{FallbackLadder, MediaTools};

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("a.wav");
    std::fs::write(&input, b"low-res").unwrap();
    let output = dir.path().join("b.wav");
    let ladder = FallbackLadder::new(
        runner(vec![sh_form(r#"printf high-res > "$2/a_AudioSR_Processed_48K.wav""#)]),
        MediaTools::new("/nonexistent/ffprobe", "/nonexistent/ffmpeg"),
    );
    let addr = start(ServerContext::new(Backend::Cli(ladder), false), None).await;

    let response = send(addr, &input, &output).await;

    assert_eq!(response.rc, 0, "stderr: {}", response.stderr);
    assert_eq!(std::fs::read(&output).unwrap(), b"high-res");
}
