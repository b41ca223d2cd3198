//! Plain HTTP object store over curl.
//!
//! `HEAD {base}/{container}/{key}` for size, `GET` with `Range: bytes=s-e`
//! for chunk reads, `PUT` with `Content-Range: bytes s-e/t` and a
//! `Session-Id` header for chunk uploads. The reply to the chunk that
//! completes an object may carry `{"objectId": "..."}`. Containers are
//! probed with `HEAD {base}/{container}` and created with `PUT`.
//!
//! curl calls block, so every operation runs on `spawn_blocking`.

mod parse;

use std::io::Read;
use std::str;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::planner::ByteRange;

use super::error::RemoteError;
use super::traits::ObjectStore;
use super::types::{ChunkAck, ChunkUpload, ContainerPolicy, ObjectMeta};

use self::parse::{parse_headers, parse_object_id};

/// Timeouts applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct HttpStoreOptions {
    pub connect_timeout: Duration,
    /// Abort a transfer slower than 1 KiB/s for this long.
    pub low_speed_time: Duration,
    /// Hard cap on one request.
    pub request_timeout: Duration,
}

impl Default for HttpStoreOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_time: Duration::from_secs(60),
            request_timeout: Duration::from_secs(3600),
        }
    }
}

/// `ObjectStore` backed by a plain HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    base: Url,
    options: HttpStoreOptions,
}

/// Response of one blocking request.
struct Reply {
    code: u32,
    headers: Vec<String>,
    body: Vec<u8>,
}

impl HttpObjectStore {
    /// Store rooted at `base_url` (e.g. `https://objects.example.com/v1/`).
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        Self::with_options(base_url, HttpStoreOptions::default())
    }

    pub fn with_options(base_url: &str, options: HttpStoreOptions) -> Result<Self, RemoteError> {
        let base = Url::parse(base_url)
            .map_err(|e| RemoteError::Protocol(format!("invalid base URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Protocol(format!("invalid base URL {base_url}")));
        }
        Ok(Self { base, options })
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Protocol("base URL cannot take path segments".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(&self, request: Request) -> Result<Reply, RemoteError> {
        let options = self.options;
        tokio::task::spawn_blocking(move || perform(request, options))
            .await
            .map_err(|e| RemoteError::Protocol(format!("request task failed: {e}")))?
    }
}

/// One blocking request description.
struct Request {
    method: Method,
    url: Url,
    headers: Vec<String>,
    range: Option<String>,
    body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Head,
    Get,
    Put,
}

impl Request {
    fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            range: None,
            body: None,
        }
    }
}

fn map_curl_error(e: curl::Error) -> RemoteError {
    if e.is_operation_timedout() {
        return RemoteError::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return RemoteError::Connection(e.to_string());
    }
    RemoteError::Protocol(e.to_string())
}

/// Runs one request in the current thread.
fn perform(request: Request, options: HttpStoreOptions) -> Result<Reply, RemoteError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(request.url.as_str()).map_err(map_curl_error)?;
    easy.follow_location(true).map_err(map_curl_error)?;
    easy.connect_timeout(options.connect_timeout)
        .map_err(map_curl_error)?;
    easy.low_speed_limit(1024).map_err(map_curl_error)?;
    easy.low_speed_time(options.low_speed_time)
        .map_err(map_curl_error)?;
    easy.timeout(options.request_timeout)
        .map_err(map_curl_error)?;

    match request.method {
        Method::Head => easy.nobody(true).map_err(map_curl_error)?,
        Method::Get => {}
        Method::Put => {
            easy.upload(true).map_err(map_curl_error)?;
            let len = request.body.as_ref().map(|b| b.len()).unwrap_or(0) as u64;
            easy.in_filesize(len).map_err(map_curl_error)?;
        }
    }
    if let Some(range) = &request.range {
        easy.range(range).map_err(map_curl_error)?;
    }

    let mut list = curl::easy::List::new();
    for h in &request.headers {
        list.append(h).map_err(map_curl_error)?;
    }
    if request.method == Method::Put {
        // No 100-continue round trip before chunk bodies.
        list.append("Expect:").map_err(map_curl_error)?;
    }
    easy.http_headers(list).map_err(map_curl_error)?;

    let mut headers = Vec::new();
    let mut body = Vec::new();
    let mut upload = std::io::Cursor::new(request.body.unwrap_or_default());
    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    headers.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(map_curl_error)?;
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(map_curl_error)?;
        if request.method == Method::Put {
            transfer
                .read_function(|buf| Ok(upload.read(buf).unwrap_or(0)))
                .map_err(map_curl_error)?;
        }
        transfer.perform().map_err(map_curl_error)?;
    }

    let code = easy.response_code().map_err(map_curl_error)?;
    Ok(Reply {
        code,
        headers,
        body,
    })
}

fn check_status(reply: &Reply, what: &str) -> Result<(), RemoteError> {
    match reply.code {
        200..=299 => Ok(()),
        404 => Err(RemoteError::NotFound(what.to_string())),
        code => Err(RemoteError::Http(code as u16)),
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn ensure_container(
        &self,
        container: &str,
        policy: ContainerPolicy,
    ) -> Result<(), RemoteError> {
        let url = self.url_for(&[container])?;
        let probe = self.request(Request::new(Method::Head, url.clone())).await?;
        match check_status(&probe, container) {
            Ok(()) => return Ok(()),
            Err(RemoteError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        tracing::info!(container, policy = policy.as_str(), "creating container");
        let mut create = Request::new(Method::Put, url);
        create
            .headers
            .push(format!("X-Retention-Policy: {}", policy.as_str()));
        let reply = self.request(create).await?;
        check_status(&reply, container)
    }

    async fn put_chunk(&self, chunk: &ChunkUpload) -> Result<ChunkAck, RemoteError> {
        let url = self.url_for(&[&chunk.container, &chunk.key])?;
        let mut req = Request::new(Method::Put, url);
        req.headers.push(format!("Content-Range: {}", chunk.content_range()));
        req.headers.push(format!("Session-Id: {}", chunk.session_id));
        req.headers
            .push("Content-Type: application/octet-stream".to_string());
        req.body = Some(chunk.data.clone());

        let reply = self.request(req).await?;
        check_status(&reply, &chunk.key)?;
        Ok(match parse_object_id(&reply.body) {
            Some(object_id) => ChunkAck::Stored { object_id },
            None => ChunkAck::Accepted,
        })
    }

    async fn head_object(&self, container: &str, key: &str) -> Result<ObjectMeta, RemoteError> {
        let url = self.url_for(&[container, key])?;
        let reply = self.request(Request::new(Method::Head, url)).await?;
        check_status(&reply, key)?;
        let head = parse_headers(&reply.headers);
        let size = head
            .content_length
            .ok_or_else(|| RemoteError::Protocol(format!("no Content-Length for {key}")))?;
        Ok(ObjectMeta {
            size,
            etag: head.etag,
        })
    }

    async fn get_chunk(
        &self,
        container: &str,
        key: &str,
        range: &ByteRange,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = self.url_for(&[container, key])?;
        let mut req = Request::new(Method::Get, url);
        req.range = Some(format!("{}-{}", range.start, range.end));
        let reply = self.request(req).await?;
        check_status(&reply, key)?;
        if reply.code != 206 && range.start != 0 {
            return Err(RemoteError::Protocol(format!(
                "server ignored range {} for {key} (HTTP {})",
                range.descriptor(),
                reply.code
            )));
        }
        Ok(reply.body)
    }
}
