use std::io::Read;
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use tiny_http::{Header, Response, Server};

use mindmirror_lib::analysis::{AnalysisClient, AnalysisRequest, Metric};
use mindmirror_lib::encoder::{EncodedFrame, JPEG_MIME};
use mindmirror_lib::error::AnalysisError;

struct Captured {
    method: String,
    url: String,
    content_type: Option<String>,
    body: String,
}

/// Serve exactly one request with `status`/`body` after `delay`, reporting
/// what arrived.
fn serve_once(status: u16, body: &'static str, delay: Duration) -> (String, mpsc::Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        if let Ok(mut req) = server.recv() {
            let mut received = String::new();
            let _ = req.as_reader().read_to_string(&mut received);
            let content_type = req
                .headers()
                .iter()
                .find(|h| h.field.equiv("Content-Type"))
                .map(|h| h.value.as_str().to_string());
            let _ = tx.send(Captured {
                method: req.method().to_string(),
                url: req.url().to_string(),
                content_type,
                body: received,
            });

            thread::sleep(delay);
            let header = Header::from_bytes("Content-Type", "application/json").unwrap();
            let _ = req.respond(
                Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header),
            );
        }
    });

    (format!("http://127.0.0.1:{port}"), rx)
}

fn frame() -> EncodedFrame {
    EncodedFrame {
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9],
        mime_type: JPEG_MIME,
        quality: 0.6,
        width: 640,
        height: 480,
    }
}

const OK_BODY: &str = r#"{"mood":"calm","stress":3,"energy":"high","observation":"steady gaze","advice":"keep going"}"#;

#[tokio::test]
async fn posts_frame_and_decodes_result() {
    let (url, rx) = serve_once(200, OK_BODY, Duration::ZERO);
    let client = AnalysisClient::new(&url, Duration::from_secs(5)).unwrap();

    let result = client
        .analyze(&AnalysisRequest::new("", frame()))
        .await
        .unwrap();
    assert_eq!(result.mood, "calm");
    assert_eq!(result.stress, Metric::Number(3.0));
    assert_eq!(result.energy, Metric::Text("high".into()));
    assert_eq!(result.advice, "keep going");

    let seen = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.url, "/analyze");
    assert!(seen
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("application/json")));

    let body: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(body["text"], "");
    let image = body["imageBase64"].as_str().unwrap();
    assert!(!image.starts_with("data:"));
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(image)
        .unwrap();
    assert_eq!(decoded, frame().bytes);
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let (url, rx) = serve_once(200, OK_BODY, Duration::ZERO);
    let client = AnalysisClient::new(&format!("{url}/"), Duration::from_secs(5)).unwrap();

    client
        .analyze(&AnalysisRequest::new("note", frame()))
        .await
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap().url, "/analyze");
}

#[tokio::test]
async fn server_error_keeps_body_as_diagnostic() {
    let (url, _rx) = serve_once(500, r#"{"error":"model overloaded"}"#, Duration::ZERO);
    let client = AnalysisClient::new(&url, Duration::from_secs(5)).unwrap();

    let err = client
        .analyze(&AnalysisRequest::new("", frame()))
        .await
        .unwrap_err();
    match &err {
        AnalysisError::Server { status, body } => {
            assert_eq!(*status, 500);
            assert!(body.contains("model overloaded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.diagnostic().contains("model overloaded"));
}

#[tokio::test]
async fn slow_service_times_out() {
    let (url, _rx) = serve_once(200, OK_BODY, Duration::from_millis(800));
    let client = AnalysisClient::new(&url, Duration::from_millis(100)).unwrap();

    let err = client
        .analyze(&AnalysisRequest::new("", frame()))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[tokio::test]
async fn non_json_success_is_invalid_response() {
    let (url, _rx) = serve_once(200, "<html>oops</html>", Duration::ZERO);
    let client = AnalysisClient::new(&url, Duration::from_secs(5)).unwrap();

    let err = client
        .analyze(&AnalysisRequest::new("", frame()))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_service_is_network_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client =
        AnalysisClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();

    let err = client
        .analyze(&AnalysisRequest::new("", frame()))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Network(_)), "{err:?}");
}
