use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::Transport;
use super::http::{HttpTransport, parse_poll_body};
use crate::message::Message;
use crate::utils::TransportError;

const TIMEOUT: Duration = Duration::from_secs(2);

/// Accepts a single connection, answers it with a canned response and hands
/// back the raw request text.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });

    (format!("http://{addr}"), handle)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn test_send_one_returns_assigned_id() {
    let (url, server) = serve_once("200 OK", r#"{"id":"msg-42"}"#).await;
    let transport = HttpTransport::new(&url, Some("secret".into()));
    let msg = Message::publish(json!({"k": "v"}), vec!["t".into()], None);

    let id = transport.send_one(&msg, TIMEOUT).await.unwrap();
    assert_eq!(id, "msg-42");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /messages HTTP/1.1"));
    assert!(request.to_lowercase().contains("authorization: bearer secret"));
    assert!(request.contains(r#""msg_type":"publish""#));
}

#[tokio::test]
async fn test_send_batch_wraps_messages() {
    let (url, server) = serve_once("202 Accepted", "").await;
    let transport = HttpTransport::new(&format!("{url}/"), None);
    let batch = vec![
        Message::publish(json!(1), vec![], None),
        Message::publish(json!(2), vec![], None),
    ];

    transport.send_batch(&batch, TIMEOUT).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /messages/batch HTTP/1.1"));
    assert!(request.contains(r#"{"messages":["#));
    assert!(!request.to_lowercase().contains("authorization"));
}

#[tokio::test]
async fn test_poll_no_content_is_empty() {
    let (url, server) = serve_once("204 No Content", "").await;
    let transport = HttpTransport::new(&url, None);

    let records = transport.poll(5, TIMEOUT).await.unwrap();
    assert!(records.is_empty());

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /messages?limit=5 HTTP/1.1"));
}

#[tokio::test]
async fn test_poll_decodes_records() {
    let (url, _server) = serve_once(
        "200 OK",
        r#"[{"msg_type":"command","data":{"x":1},"tags":["a"],"source":"srv"}]"#,
    )
    .await;
    let transport = HttpTransport::new(&url, None);

    let records = transport.poll(1, TIMEOUT).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].msg_type, "command");
    assert_eq!(records[0].tags.as_deref(), Some(&["a".to_string()][..]));
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (url, _server) = serve_once("503 Service Unavailable", "").await;
    let transport = HttpTransport::new(&url, None);

    let err = transport.probe(TIMEOUT).await.unwrap_err();
    assert_eq!(err, TransportError::Status(503));
}

#[tokio::test]
async fn test_presence_uses_put() {
    let (url, server) = serve_once("200 OK", "").await;
    let transport = HttpTransport::new(&url, None);

    transport.set_presence(false, TIMEOUT).await.unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("PUT /presence HTTP/1.1"));
    assert!(request.contains(r#"{"online":false}"#));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(&format!("http://{addr}"), None);
    let err = transport.probe(TIMEOUT).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn test_silent_endpoint_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let transport = HttpTransport::new(&format!("http://{addr}"), None);
    let err = transport
        .probe(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Timeout);
}

#[test]
fn test_parse_poll_body() {
    assert!(parse_poll_body("  \n").unwrap().is_empty());
    assert!(parse_poll_body("[]").unwrap().is_empty());
    assert!(matches!(
        parse_poll_body("{not json"),
        Err(TransportError::Decode(_))
    ));
}
