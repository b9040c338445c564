//! Canned-response HTTP server for exercising the fetch loops.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct MockServer {
    pub base_url: String,
    request_lines: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    /// Serves `responses` in order, one per connection, then stops listening.
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let request_lines = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&request_lines);

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                if let Some(line) = read_request_line(&mut stream).await {
                    seen.lock().expect("requests lock").push(line);
                }
                let reply = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            request_lines,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.request_lines.lock().expect("requests lock").clone()
    }

    pub fn query_values(&self, name: &str) -> Vec<String> {
        let key = format!("%24{name}=");
        self.requests()
            .iter()
            .filter_map(|line| {
                let target = line.split_whitespace().nth(1)?;
                let (_, query) = target.split_once('?')?;
                query
                    .split('&')
                    .find_map(|pair| pair.strip_prefix(&key))
                    .map(str::to_string)
            })
            .collect()
    }
}

async fn read_request_line(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .next()
        .map(str::to_string)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
