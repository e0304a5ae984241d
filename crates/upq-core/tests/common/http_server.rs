//! Minimal HTTP/1.1 server for integration tests.
//!
//! GET returns a static body. POST reads the whole request (multipart
//! uploads included), records it, and answers with a canned JSON reply.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A POST the server received.
#[derive(Debug, Clone)]
pub struct RecordedPost {
    /// Request target, path plus query.
    pub target: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub upload_status: u16,
    pub upload_reply: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            upload_status: 200,
            upload_reply: r#"{"msg":"OK","filecode":"srv123"}"#.to_string(),
        }
    }
}

pub struct TestServer {
    pub base_url: String,
    posts: Arc<Mutex<Vec<RecordedPost>>>,
}

impl TestServer {
    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }
}

/// Starts a server in a background thread serving `body` to GETs. The server
/// runs until the process exits.
pub fn start(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    let posts: Arc<Mutex<Vec<RecordedPost>>> = Arc::default();
    {
        let posts = Arc::clone(&posts);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let body = Arc::clone(&body);
                let opts = Arc::clone(&opts);
                let posts = Arc::clone(&posts);
                thread::spawn(move || handle(stream, &body, &opts, &posts));
            }
        });
    }
    TestServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        posts,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: &ServerOptions, posts: &Mutex<Vec<RecordedPost>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));

    let Some((head, mut rest)) = read_head(&mut stream) else {
        return;
    };
    let (method, target, content_length, expects_continue) = parse_head(&head);

    if method.eq_ignore_ascii_case("GET") {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(body);
        return;
    }

    if method.eq_ignore_ascii_case("POST") {
        if expects_continue {
            let _ = stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n");
        }
        let mut buf = [0u8; 8192];
        while rest.len() < content_length {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => rest.extend_from_slice(&buf[..n]),
            }
        }
        posts.lock().unwrap().push(RecordedPost {
            target: target.to_string(),
            body: rest,
        });
        let response = format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            opts.upload_status,
            opts.upload_reply.len(),
            opts.upload_reply
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
}

/// Reads up to the blank line. Returns the header text and any body bytes
/// that arrived with it.
fn read_head(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..pos]).into_owned();
            return Some((head, data[pos + 4..].to_vec()));
        }
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }
}

/// Returns (method, target, content length, whether `Expect: 100-continue` was sent).
fn parse_head(head: &str) -> (&str, &str, usize, bool) {
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("");
    let target = request_line.next().unwrap_or("/");
    let mut content_length = 0;
    let mut expects_continue = false;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("expect") {
                expects_continue = value.trim().eq_ignore_ascii_case("100-continue");
            }
        }
    }
    (method, target, content_length, expects_continue)
}
