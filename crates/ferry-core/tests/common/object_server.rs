//! Minimal HTTP/1.1 object server for integration tests.
//!
//! Paths are `/{container}` and `/{container}/{key}` (segments percent-decoded).
//! - `HEAD /{container}`: 200 if the container exists, else 404.
//! - `PUT /{container}`: creates it, remembering `X-Retention-Policy`.
//! - `HEAD /{container}/{key}`: `Content-Length` of a stored object, else 404.
//! - `GET /{container}/{key}` with `Range: bytes=s-e`: 206 with that slice.
//! - `PUT /{container}/{key}` with `Content-Range: bytes s-e/t` and
//!   `Session-Id`: buffers the chunk; the chunk that completes the object is
//!   answered with 201 and `{"objectId": "http:{container}/{key}"}`.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct State {
    containers: HashMap<String, String>,
    objects: HashMap<(String, String), Vec<u8>>,
    /// session id -> (total, start -> bytes)
    sessions: HashMap<String, (u64, BTreeMap<u64, Vec<u8>>)>,
    put_chunks: usize,
}

/// Handle to a running server.
#[derive(Clone)]
pub struct ObjectServer {
    base_url: String,
    state: Arc<Mutex<State>>,
}

impl ObjectServer {
    /// Starts a server in a background thread. It runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let server_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&server_state);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base_url: format!("http://127.0.0.1:{}/v1/", port),
            state,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn put_object(&self, container: &str, key: &str, data: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((container.to_string(), key.to_string()), data);
    }

    pub fn object(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    pub fn container_policy(&self, container: &str) -> Option<String> {
        self.state.lock().unwrap().containers.get(container).cloned()
    }

    pub fn put_chunks(&self) -> usize {
        self.state.lock().unwrap().put_chunks
    }
}

struct Request {
    method: String,
    segments: Vec<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(b) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = std::str::from_utf8(&buf[..header_end]).ok()?.to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?;
    let path = path.split('?').next().unwrap_or("");
    let segments: Vec<String> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .skip(1) // "v1"
        .map(percent_decode)
        .collect();

    let mut headers = Vec::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Some(Request {
        method,
        segments,
        headers,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: &str, extra_headers: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n",
        status,
        body.len(),
        extra_headers
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

/// `bytes=s-e` or `bytes s-e/t` -> (s, e, t?)
fn parse_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let value = value.trim();
    let rest = value
        .strip_prefix("bytes=")
        .or_else(|| value.strip_prefix("bytes "))?;
    let (span, total) = match rest.split_once('/') {
        Some((span, total)) => (span, total.trim().parse::<u64>().ok()),
        None => (rest, None),
    };
    let (a, b) = span.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?, total))
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };

    match (req.method.as_str(), req.segments.len()) {
        ("HEAD", 1) => {
            let exists = state.lock().unwrap().containers.contains_key(&req.segments[0]);
            if exists {
                respond(&mut stream, "200 OK", "", b"");
            } else {
                respond(&mut stream, "404 Not Found", "", b"");
            }
        }
        ("PUT", 1) => {
            let policy = req.header("x-retention-policy").unwrap_or("").to_string();
            state
                .lock()
                .unwrap()
                .containers
                .insert(req.segments[0].clone(), policy);
            respond(&mut stream, "201 Created", "", b"");
        }
        ("HEAD", 2) => {
            let key = (req.segments[0].clone(), req.segments[1].clone());
            let len = state.lock().unwrap().objects.get(&key).map(|o| o.len());
            match len {
                // Announce the object size; HEAD carries no body.
                Some(len) => {
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
                        len
                    );
                    let _ = stream.write_all(head.as_bytes());
                }
                None => respond(&mut stream, "404 Not Found", "", b""),
            }
        }
        ("GET", 2) => {
            let key = (req.segments[0].clone(), req.segments[1].clone());
            let data = state.lock().unwrap().objects.get(&key).cloned();
            let Some(data) = data else {
                respond(&mut stream, "404 Not Found", "", b"");
                return;
            };
            let total = data.len() as u64;
            match req.header("range").and_then(parse_range) {
                Some((start, end, _)) if start < total => {
                    let end = end.min(total - 1);
                    let slice = &data[start as usize..=end as usize];
                    let extra = format!("Content-Range: bytes {}-{}/{}\r\n", start, end, total);
                    respond(&mut stream, "206 Partial Content", &extra, slice);
                }
                Some(_) => respond(&mut stream, "416 Range Not Satisfiable", "", b""),
                None => respond(&mut stream, "200 OK", "", &data),
            }
        }
        ("PUT", 2) => {
            let (container, key) = (req.segments[0].clone(), req.segments[1].clone());
            let range = req.header("content-range").and_then(parse_range);
            let session = req.header("session-id").map(str::to_string);
            let (Some((start, end, Some(total))), Some(session)) = (range, session) else {
                respond(&mut stream, "400 Bad Request", "", b"");
                return;
            };
            if (end - start + 1) as usize != req.body.len() {
                respond(&mut stream, "400 Bad Request", "", b"");
                return;
            }

            let mut st = state.lock().unwrap();
            st.put_chunks += 1;
            let entry = st
                .sessions
                .entry(session.clone())
                .or_insert_with(|| (total, BTreeMap::new()));
            entry.1.insert(start, req.body);
            let received: u64 = entry.1.values().map(|p| p.len() as u64).sum();
            if received < total {
                drop(st);
                respond(&mut stream, "202 Accepted", "", b"");
                return;
            }

            let (total, parts) = st.sessions.remove(&session).unwrap_or_default();
            let mut object = vec![0u8; total as usize];
            for (start, bytes) in parts {
                let start = start as usize;
                object[start..start + bytes.len()].copy_from_slice(&bytes);
            }
            st.objects.insert((container.clone(), key.clone()), object);
            drop(st);
            let body = format!(r#"{{"objectId":"http:{}/{}"}}"#, container, key);
            respond(
                &mut stream,
                "201 Created",
                "Content-Type: application/json\r\n",
                body.as_bytes(),
            );
        }
        _ => respond(&mut stream, "405 Method Not Allowed", "", b""),
    }
}
