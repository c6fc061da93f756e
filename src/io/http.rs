use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{MemoryReader, ReadAt};
use anyhow::{Context, Result, anyhow, bail};

/// HTTP Range reader for remote run log archives
pub struct HttpRangeReader {
    client: Client,
    url: String,
    token: Option<String>,
    size: u64,
    accepts_ranges: bool,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to learn the archive size and whether
    /// the server honours Range requests. Redirects are followed, so the
    /// URL may point at an API endpoint that forwards to blob storage.
    ///
    /// The token is only ever sent to the origin of `url`. When the
    /// redirects end on another origin, later requests go out without it.
    pub async fn new(url: String, token: Option<String>) -> Result<Self> {
        let requested = Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let resp = authorize(client.head(requested.clone()), token.as_deref())
            .send()
            .await?;

        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        // Keep talking to wherever the redirects led
        let resolved = resp.url().clone();
        let token = if resolved.origin() == requested.origin() {
            token
        } else {
            if token.is_some() {
                debug!(
                    origin = %resolved.origin().ascii_serialization(),
                    "redirected off origin, dropping token"
                );
            }
            None
        };
        let url = resolved.to_string();

        let accepts_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"));

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))?;

        debug!(%url, size, accepts_ranges, "resolved remote archive");

        Ok(Self {
            client,
            url,
            token,
            size,
            accepts_ranges,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    /// Whether the server advertised `Accept-Ranges: bytes`
    pub fn accepts_ranges(&self) -> bool {
        self.accepts_ranges
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Download the whole archive in a single request.
    ///
    /// Used when the server does not support Range requests.
    pub async fn download(&self) -> Result<MemoryReader> {
        let resp = authorize(self.client.get(&self.url), self.token.as_deref())
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }
        let bytes = resp.bytes().await?;
        self.transferred_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(MemoryReader::new(bytes.to_vec()))
    }
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let result = authorize(self.client.get(&self.url), self.token.as_deref())
                .header("Range", &range)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    if resp.status() != StatusCode::PARTIAL_CONTENT {
                        bail!("HTTP request failed with status: {}", resp.status());
                    }

                    let bytes = resp.bytes().await?;
                    if bytes.is_empty() {
                        bail!("Empty response for range {}", range);
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded");
                    }
                    warn!(
                        retry = retry_count,
                        max_retry = self.max_retry,
                        error = %e,
                        "connection error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const ARCHIVE: &[u8] = b"PK\x03\x04 pretend this is a run log archive";

    /// What the loopback server saw of one request
    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        path: String,
        headers: Vec<(String, String)>,
    }

    impl Seen {
        fn parse(raw: &[u8]) -> Self {
            let text = String::from_utf8_lossy(raw);
            let mut lines = text.split("\r\n");
            let mut request_line = lines.next().unwrap_or_default().split_whitespace();
            let method = request_line.next().unwrap_or_default().to_string();
            let path = request_line.next().unwrap_or_default().to_string();
            let headers = lines
                .take_while(|line| !line.is_empty())
                .filter_map(|line| line.split_once(':'))
                .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
                .collect();
            Self {
                method,
                path,
                headers,
            }
        }

        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        }
    }

    type Handler = Box<dyn Fn(&Seen) -> Vec<u8> + Send + Sync>;

    /// Serve one response per connection on an ephemeral loopback port
    async fn serve(handler: Handler) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut raw = Vec::new();
                let mut chunk = [0u8; 1024];
                while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => raw.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = Seen::parse(&raw);
                let response = handler(&request);
                log.lock().unwrap().push(request);
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            }
        });

        (base, seen)
    }

    fn respond(status: &str, headers: &[(&str, String)], body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
        for (name, value) in headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        let mut out = out.into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn redirect(location: String) -> Vec<u8> {
        respond(
            "302 Found",
            &[("Location", location), ("Content-Length", "0".into())],
            b"",
        )
    }

    /// Storage for `ARCHIVE`. `ranges` controls whether Range is advertised
    /// in HEAD, `partial` whether ranged GETs answer with 206.
    fn storage(request: &Seen, ranges: bool, partial: bool) -> Vec<u8> {
        let mut headers = vec![("Content-Length", ARCHIVE.len().to_string())];
        if ranges {
            headers.push(("Accept-Ranges", "bytes".into()));
        }
        if request.method == "HEAD" {
            return respond("200 OK", &headers, b"");
        }

        let range = request
            .header("range")
            .and_then(|value| value.strip_prefix("bytes="))
            .and_then(|value| value.split_once('-'))
            .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));
        match range {
            Some((start, end)) if partial => {
                let end = end.min(ARCHIVE.len() - 1);
                let body = &ARCHIVE[start..=end];
                respond(
                    "206 Partial Content",
                    &[
                        ("Content-Length", body.len().to_string()),
                        (
                            "Content-Range",
                            format!("bytes {}-{}/{}", start, end, ARCHIVE.len()),
                        ),
                    ],
                    body,
                )
            }
            _ => respond("200 OK", &headers, ARCHIVE),
        }
    }

    fn authorizations(seen: &Mutex<Vec<Seen>>) -> Vec<Option<String>> {
        seen.lock()
            .unwrap()
            .iter()
            .map(|request| request.header("authorization").map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_token_not_forwarded_to_other_origin() {
        let (blob, blob_seen) = serve(Box::new(|request: &Seen| storage(request, true, true))).await;
        let location = format!("{}/run-logs.zip", blob);
        let (api, api_seen) = serve(Box::new(move |_: &Seen| redirect(location.clone()))).await;

        let reader = HttpRangeReader::new(format!("{}/runs/1/logs", api), Some("secret".into()))
            .await
            .unwrap();
        assert_eq!(reader.size(), ARCHIVE.len() as u64);
        assert!(reader.accepts_ranges());

        let mut buf = [0u8; 4];
        reader.read_exact_at(0, &mut buf).await.unwrap();
        assert_eq!(&buf, b"PK\x03\x04");
        reader.download().await.unwrap();

        assert_eq!(
            authorizations(&api_seen),
            vec![Some("Bearer secret".to_string())]
        );
        let blob_auth = authorizations(&blob_seen);
        assert_eq!(blob_auth.len(), 3);
        assert!(blob_auth.iter().all(Option::is_none), "{blob_auth:?}");
    }

    #[tokio::test]
    async fn test_token_kept_on_same_origin() {
        let (base, seen) = serve(Box::new(|request: &Seen| {
            if request.path == "/archive.zip" {
                storage(request, true, true)
            } else {
                redirect("/archive.zip".into())
            }
        }))
        .await;

        let reader = HttpRangeReader::new(format!("{}/logs", base), Some("secret".into()))
            .await
            .unwrap();
        let mut buf = [0u8; 7];
        reader.read_exact_at(4, &mut buf).await.unwrap();
        assert_eq!(&buf, b" preten");

        let requests = seen.lock().unwrap().clone();
        let ranged = requests
            .iter()
            .find(|request| request.method == "GET")
            .unwrap();
        assert_eq!(ranged.path, "/archive.zip");
        assert_eq!(ranged.header("range"), Some("bytes=4-10"));
        assert_eq!(ranged.header("authorization"), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn test_download_without_range_support() {
        let (base, seen) = serve(Box::new(|request: &Seen| storage(request, false, false))).await;

        let reader = HttpRangeReader::new(format!("{}/archive.zip", base), None)
            .await
            .unwrap();
        assert!(!reader.accepts_ranges());

        let memory = reader.download().await.unwrap();
        assert_eq!(memory.size(), ARCHIVE.len() as u64);
        assert_eq!(reader.transferred_bytes(), ARCHIVE.len() as u64);

        let mut buf = vec![0u8; ARCHIVE.len()];
        memory.read_exact_at(0, &mut buf).await.unwrap();
        assert_eq!(buf, ARCHIVE);

        let requests = seen.lock().unwrap().clone();
        assert!(requests.iter().all(|request| request.header("range").is_none()));
        assert!(requests.iter().all(|request| request.header("authorization").is_none()));
    }

    #[tokio::test]
    async fn test_range_ignored_by_server_is_an_error() {
        let (base, _) = serve(Box::new(|request: &Seen| storage(request, true, false))).await;

        let reader = HttpRangeReader::new(format!("{}/archive.zip", base), None)
            .await
            .unwrap();
        let mut buf = [0u8; 4];
        let err = reader.read_at(8, &mut buf).await.unwrap_err();
        assert!(err.to_string().contains("200"), "{err}");
    }

    #[tokio::test]
    async fn test_read_past_end_is_empty() {
        let (base, seen) = serve(Box::new(|request: &Seen| storage(request, true, true))).await;

        let reader = HttpRangeReader::new(format!("{}/archive.zip", base), None)
            .await
            .unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(ARCHIVE.len() as u64, &mut buf).await.unwrap(), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
