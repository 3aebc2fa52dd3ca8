//! SlmClient against a one-shot local HTTP responder.

use refinement::{GenerationParams, Generator, GeneratorError};
use rtl_agent::{ApiFlavor, EndpointConfig, SlmClient};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one request with `status` and `body`; yields the request line and JSON body.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<(String, Value)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();

        let request_line = head.lines().next().unwrap_or_default().to_string();
        let json = serde_json::from_slice(&buf[header_end..]).unwrap_or(Value::Null);
        (request_line, json)
    });

    (url, handle)
}

fn client(url: String, flavor: ApiFlavor) -> SlmClient {
    let endpoint = EndpointConfig {
        url,
        model: "deepseek".into(),
        flavor,
        api_key: Some("secret".into()),
    };
    SlmClient::new(endpoint, Duration::from_secs(10)).unwrap()
}

fn params() -> GenerationParams {
    GenerationParams {
        temperature: 0.3,
        max_length: 2048,
    }
}

#[tokio::test]
async fn test_generate_posts_expected_payload() {
    let (url, server) = serve_once("200 OK", r#"{"generated_text": "module m; endmodule"}"#).await;
    let text = client(url, ApiFlavor::Generate)
        .generate("write a module", &params())
        .await
        .unwrap();
    assert_eq!(text, "module m; endmodule");

    let (request_line, body) = server.await.unwrap();
    assert!(request_line.starts_with("POST /generate "), "{request_line}");
    assert_eq!(body["prompt"], "write a module");
    assert_eq!(body["model"], "deepseek");
    assert_eq!(body["max_length"], 2048);
    assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn test_generate_uses_fallback_field() {
    let (url, server) = serve_once("200 OK", r#"{"output": "module o; endmodule"}"#).await;
    let text = client(url, ApiFlavor::Generate)
        .generate("p", &params())
        .await
        .unwrap();
    assert_eq!(text, "module o; endmodule");
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let (url, server) = serve_once("503 Service Unavailable", r#"{"detail": "loading"}"#).await;
    let err = client(url, ApiFlavor::Generate)
        .generate("p", &params())
        .await
        .unwrap_err();
    match &err {
        GeneratorError::Transport(msg) => assert!(msg.contains("503"), "{msg}"),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(err.is_transient());
    server.await.unwrap();
}

#[tokio::test]
async fn test_undecodable_body_is_malformed() {
    let (url, server) = serve_once("200 OK", "<html>oops</html>").await;
    let err = client(url, ApiFlavor::Generate)
        .generate("p", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, GeneratorError::Malformed(_)), "{err:?}");
    assert!(!err.is_transient());
    server.await.unwrap();
}

#[tokio::test]
async fn test_chat_completions_flavor() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"choices": [{"message": {"role": "assistant", "content": "module c; endmodule"}}]}"#,
    )
    .await;
    let text = client(url, ApiFlavor::ChatCompletions)
        .generate("write a module", &params())
        .await
        .unwrap();
    assert_eq!(text, "module c; endmodule");

    let (request_line, body) = server.await.unwrap();
    assert!(request_line.starts_with("POST /chat/completions "), "{request_line}");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "write a module");
    assert_eq!(body["max_tokens"], 2048);
}

#[tokio::test]
async fn test_chat_without_choices_is_malformed() {
    let (url, server) = serve_once("200 OK", r#"{"choices": []}"#).await;
    let err = client(url, ApiFlavor::ChatCompletions)
        .generate("p", &params())
        .await
        .unwrap_err();
    assert!(matches!(err, GeneratorError::Malformed(_)), "{err:?}");
    server.await.unwrap();
}
