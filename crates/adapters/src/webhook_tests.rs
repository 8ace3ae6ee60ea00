// SPDX-License-Identifier: MIT

use super::*;
use crate::notify::RunReport;
use quarry_core::{FinalOutcome, RunId};
use std::io::{Read, Write};
use std::net::TcpListener;

fn report() -> RunReport {
    RunReport {
        run_id: RunId::from_string("run-1"),
        job_id: None,
        outcome: FinalOutcome::Success,
        exit_code: 0,
        duration_ms: 10,
        stats: Default::default(),
    }
}

/// Tiny blocking HTTP server answering `responses` in order, one
/// connection each.
fn serve(responses: Vec<&'static str>) -> (String, std::thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = std::thread::spawn(move || {
        let mut bodies = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 8192];
            let n = stream.read(&mut buf).unwrap_or(0);
            bodies.push(String::from_utf8_lossy(&buf[..n]).to_string());
            stream.write_all(response.as_bytes()).expect("write");
        }
        bodies
    });
    (format!("http://{addr}/hook"), handle)
}

const OK: &str = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const SERVER_ERROR: &str =
    "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
const BAD_REQUEST: &str =
    "HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

#[tokio::test]
async fn delivers_report_as_json_post() {
    let (url, server) = serve(vec![OK]);
    let mut config = WebhookConfig::new(url);
    config.headers.push(("x-quarry-token".into(), "abc".into()));
    let adapter = WebhookAdapter::new(config, CancellationToken::new()).unwrap();

    adapter.notify(&report()).await.unwrap();

    let bodies = server.join().unwrap();
    assert!(bodies[0].contains("POST /hook"));
    assert!(bodies[0].contains("x-quarry-token"));
    assert!(bodies[0].contains("\"outcome\":\"success\""));
}

#[tokio::test]
async fn retries_5xx_then_succeeds() {
    let (url, server) = serve(vec![SERVER_ERROR, OK]);
    let mut config = WebhookConfig::new(url);
    config.retries = 2;
    let adapter = WebhookAdapter::new(config, CancellationToken::new()).unwrap();

    adapter.notify(&report()).await.unwrap();
    assert_eq!(server.join().unwrap().len(), 2);
}

#[tokio::test]
async fn client_error_fails_fast_without_retry() {
    let (url, server) = serve(vec![BAD_REQUEST]);
    let mut config = WebhookConfig::new(url);
    config.retries = 3;
    let adapter = WebhookAdapter::new(config, CancellationToken::new()).unwrap();

    let err = adapter.notify(&report()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Rejected { status: 400 }));
    // Exactly one request reached the server
    assert_eq!(server.join().unwrap().len(), 1);
}

#[tokio::test]
async fn cancelled_token_aborts_before_attempt() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let adapter =
        WebhookAdapter::new(WebhookConfig::new("http://127.0.0.1:1/hook"), cancel).unwrap();

    let err = adapter.notify(&report()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Cancelled));
}

#[tokio::test]
async fn exhausted_retries_return_last_error() {
    let mut config = WebhookConfig::new("http://127.0.0.1:1/hook");
    config.retries = 1;
    config.timeout = std::time::Duration::from_millis(200);
    let adapter = WebhookAdapter::new(config, CancellationToken::new()).unwrap();

    let err = adapter.notify(&report()).await.unwrap_err();
    assert!(matches!(err, NotifyError::SendFailed(_)));
}
