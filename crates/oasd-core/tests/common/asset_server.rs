//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed route map. HEAD answers with Content-Length only; GET
//! streams the body, optionally throttled into delayed chunks so a test can
//! cancel a transfer midway. Unknown paths return 404.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct AssetServerOptions {
    /// When set, GET bodies are written in `chunks` pieces with this delay
    /// between writes.
    pub chunk_delay: Option<Duration>,
    pub chunks: usize,
}

impl Default for AssetServerOptions {
    fn default() -> Self {
        Self {
            chunk_delay: None,
            chunks: 1,
        }
    }
}

/// Starts a server in a background thread serving `routes` (path with
/// leading slash -> body). Returns the base URL, trailing slash included.
pub fn start(routes: HashMap<String, Vec<u8>>) -> String {
    start_with_options(routes, AssetServerOptions::default())
}

pub fn start_with_options(routes: HashMap<String, Vec<u8>>, opts: AssetServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes = Arc::new(routes);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            thread::spawn(move || handle(stream, &routes, opts));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

fn handle(
    mut stream: std::net::TcpStream,
    routes: &HashMap<String, Vec<u8>>,
    opts: AssetServerOptions,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let Some(body) = routes.get(path) else {
        let _ = stream.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    if method.eq_ignore_ascii_case("HEAD") {
        let _ = stream.write_all(header.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }

    let _ = stream.write_all(header.as_bytes());
    match opts.chunk_delay {
        None => {
            let _ = stream.write_all(body);
        }
        Some(delay) => {
            let chunk = (body.len() / opts.chunks.max(1)).max(1);
            for piece in body.chunks(chunk) {
                if stream.write_all(piece).is_err() {
                    return;
                }
                let _ = stream.flush();
                thread::sleep(delay);
            }
        }
    }
}
