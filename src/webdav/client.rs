//! WebDAV Client
//!
//! Issues PROPFIND/GET/PUT/MKCOL requests against a WebDAV file store.
//! Connection limits are configured once at construction: reqwest keeps the
//! per-host idle pool and a semaphore bounds the total number of requests in
//! flight (a download holds its permit until the body stream is dropped).

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, RequestBuilder, Response};
use tokio::io::AsyncReadExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::errors::WebDavError;
use super::source::{ByteStream, RemoteFileSource};
use super::types::{
    parse_multistatus, Depth, RemoteFile, PROPFIND_FILE_PROPERTIES, PROPFIND_RESOURCE_TYPE_ONLY,
};

/// 207 Multi-Status
const MULTI_STATUS: u16 = 207;

/// 301 Moved Permanently, the only redirect WebDAV servers send for collections
const MOVED_PERMANENTLY: u16 = 301;

/// Redirect hops followed for a PROPFIND before giving up
const MAX_REDIRECT_HOPS: usize = 1;

/// Chunk size used when streaming a local file into a PUT body
const UPLOAD_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Connection and timeout settings for a [`WebDavClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Optional Basic credentials
    pub credentials: Option<(String, String)>,
    /// Idle connections kept per host
    pub max_connections_per_host: usize,
    /// Requests allowed in flight across all hosts
    pub max_total_connections: usize,
    /// Total time allowed for a single request, body included
    pub transfer_timeout: Duration,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            max_connections_per_host: 100,
            max_total_connections: 100,
            transfer_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// WebDAV client for metadata, download and upload requests
pub struct WebDavClient {
    /// HTTP client (redirects are handled manually)
    http_client: Client,
    /// Base URL that standard paths are appended to
    base_url: String,
    /// Pre-computed Basic auth header
    auth_header: Option<String>,
    /// User name for upload directory naming
    username: Option<String>,
    /// Bounds the number of requests in flight
    permits: Arc<Semaphore>,
    /// Client start time used in upload directory names
    client_start: String,
    /// Local host name used in upload directory names
    host_name: String,
    /// Number of upload directories handed out so far
    upload_count: AtomicU64,
}

impl WebDavClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Base URL that standard paths are resolved against
    /// * `options` - Credentials, connection limits and timeouts
    ///
    /// # Returns
    /// A client ready for requests
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self, WebDavError> {
        Url::parse(base_url)
            .map_err(|e| WebDavError::MalformedUrl(base_url.to_string(), e.to_string()))?;

        let http_client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(options.max_connections_per_host)
            .timeout(options.transfer_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| WebDavError::Network(format!("failed to create HTTP client: {}", e)))?;

        let auth_header = options.credentials.as_ref().map(|(user, password)| {
            let credentials = format!("{}:{}", user, password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            format!("Basic {}", encoded)
        });

        let host_name = nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        info!(
            base_url = base_url,
            user = options.credentials.as_ref().map(|(u, _)| u.as_str()).unwrap_or("anonymous"),
            max_total = options.max_total_connections,
            "WebDAV client ready"
        );

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
            auth_header,
            username: options.credentials.map(|(user, _)| user),
            permits: Arc::new(Semaphore::new(options.max_total_connections.max(1))),
            client_start: chrono::Local::now().format("%Y%m%d-%H%M%S-%3f").to_string(),
            host_name,
            upload_count: AtomicU64::new(0),
        })
    }

    /// Base URL that standard paths are appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait for a free request slot
    async fn acquire(&self) -> Result<OwnedSemaphorePermit, WebDavError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WebDavError::Network("connection limiter closed".to_string()))
    }

    /// Attach credentials to a request
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_header {
            Some(header) => request.header(AUTHORIZATION, header),
            None => request,
        }
    }

    /// Send a PROPFIND and return the raw response
    async fn send_propfind(
        &self,
        url: &Url,
        depth: Depth,
        body: &'static str,
    ) -> Result<Response, WebDavError> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| WebDavError::Network(format!("invalid method: {}", e)))?;

        let request = self
            .authorize(self.http_client.request(method, url.clone()))
            .header("Depth", depth.header_value())
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(body);

        let response = request
            .send()
            .await
            .map_err(|e| WebDavError::from_transport(&e, url.as_str()))?;

        trace!(status = response.status().as_u16(), url = %url, "PROPFIND");
        Ok(response)
    }

    /// PROPFIND with a single transparent redirect hop
    ///
    /// # Returns
    /// The URL that finally answered and its parsed descriptors
    async fn multistatus(&self, url: &Url, depth: Depth) -> Result<(Url, Vec<RemoteFile>), WebDavError> {
        let mut target = url.clone();

        for hop in 0..=MAX_REDIRECT_HOPS {
            let _permit = self.acquire().await?;
            let response = self.send_propfind(&target, depth, PROPFIND_FILE_PROPERTIES).await?;
            let status = response.status().as_u16();

            match status {
                MULTI_STATUS => {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| WebDavError::from_transport(&e, target.as_str()))?;
                    let files = parse_multistatus(&target, &body)?;
                    if files.is_empty() {
                        return Err(WebDavError::MalformedResponse {
                            href: target.to_string(),
                            reason: "empty multi-status response".to_string(),
                        });
                    }
                    return Ok((target, files));
                }
                MOVED_PERMANENTLY if hop < MAX_REDIRECT_HOPS => {
                    let moved = redirect_target(&target, &response)?;
                    debug!(from = %target, to = %moved, "Following PROPFIND redirect");
                    target = moved;
                }
                MOVED_PERMANENTLY => return Err(WebDavError::RedirectLoop(url.to_string())),
                _ => return Err(WebDavError::from_status(status, "PROPFIND", target.as_str())),
            }
        }

        Err(WebDavError::RedirectLoop(url.to_string()))
    }

    /// Upload a byte stream, replacing any existing resource
    ///
    /// # Arguments
    /// * `url` - Destination URL
    /// * `body` - Content to upload
    pub async fn upload(&self, url: &Url, body: ByteStream) -> Result<(), WebDavError> {
        let _permit = self.acquire().await?;

        let response = self
            .authorize(self.http_client.put(url.clone()))
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| WebDavError::from_transport(&e, url.as_str()))?;

        let status = response.status().as_u16();
        trace!(status = status, url = %url, "PUT");

        match status {
            201 | 204 => {
                debug!(url = %url, "Uploaded resource");
                Ok(())
            }
            _ => Err(WebDavError::from_status(status, "PUT", url.as_str())),
        }
    }

    /// Upload a local file
    ///
    /// # Arguments
    /// * `url` - Destination URL
    /// * `path` - Local file to stream
    pub async fn upload_file(&self, url: &Url, path: &Path) -> Result<(), WebDavError> {
        let file = tokio::fs::File::open(path).await?;
        info!(url = %url, file = %path.display(), "Uploading file");
        self.upload(url, file_stream(file)).await
    }

    /// Create a collection
    ///
    /// Only 201 Created counts as success, so an already existing collection
    /// is reported as an error.
    pub async fn create_directory(&self, url: &Url) -> Result<(), WebDavError> {
        let _permit = self.acquire().await?;

        let method = Method::from_bytes(b"MKCOL")
            .map_err(|e| WebDavError::Network(format!("invalid method: {}", e)))?;

        let response = self
            .authorize(self.http_client.request(method, url.clone()))
            .send()
            .await
            .map_err(|e| WebDavError::from_transport(&e, url.as_str()))?;

        let status = response.status().as_u16();
        trace!(status = status, url = %url, "MKCOL");

        if status == 201 {
            debug!(url = %url, "Created collection");
            Ok(())
        } else {
            Err(WebDavError::from_status(status, "MKCOL", url.as_str()))
        }
    }

    /// Build a directory path under `root` that no other client or upload
    /// from this client will use
    ///
    /// The name combines the client start time, host, user and a per-client
    /// counter: `<root>/<start>__<host>__<user>__<n>/`.
    pub fn unique_upload_directory_path(&self, root: &str) -> String {
        let count = self.upload_count.fetch_add(1, Ordering::SeqCst) + 1;
        let separator = if root.ends_with('/') { "" } else { "/" };
        format!(
            "{}{}{}__{}__{}__{}/",
            root,
            separator,
            self.client_start,
            self.host_name,
            self.username.as_deref().unwrap_or("anonymous"),
            count
        )
    }

    /// Whether a directory can be read with the configured credentials
    pub async fn can_read_directory(&self, url: &Url) -> bool {
        match self.describe(url).await {
            Ok(_) => true,
            Err(e) => {
                warn!(url = %url, error = %e, "Directory is not readable");
                false
            }
        }
    }
}

#[async_trait]
impl RemoteFileSource for WebDavClient {
    fn resolve_url(&self, standard_path: &str) -> Result<Url, WebDavError> {
        let href = format!("{}{}", self.base_url.trim_end_matches('/'), standard_path);
        Url::parse(&href).map_err(|e| WebDavError::MalformedUrl(href, e.to_string()))
    }

    async fn describe(&self, url: &Url) -> Result<RemoteFile, WebDavError> {
        let (_, mut files) = self.multistatus(url, Depth::Zero).await?;
        let first = files.swap_remove(0);
        Ok(RemoteFile {
            url: url.clone(),
            ..first
        })
    }

    async fn is_available(&self, url: &Url) -> Result<bool, WebDavError> {
        let _permit = self.acquire().await?;
        let response = self
            .send_propfind(url, Depth::Zero, PROPFIND_RESOURCE_TYPE_ONLY)
            .await?;
        let status = response.status().as_u16();
        Ok(status == MULTI_STATUS || status == MOVED_PERMANENTLY)
    }

    async fn list_files(&self, url: &Url, recursive: bool) -> Result<Vec<RemoteFile>, WebDavError> {
        let depth = if recursive { Depth::Infinity } else { Depth::One };
        let (_, files) = self.multistatus(url, depth).await?;
        let files: Vec<RemoteFile> = files.into_iter().filter(|f| !f.is_directory).collect();
        debug!(url = %url, recursive = recursive, count = files.len(), "Listed remote files");
        Ok(files)
    }

    async fn open(&self, url: &Url) -> Result<ByteStream, WebDavError> {
        let permit = self.acquire().await?;

        let response = self
            .authorize(self.http_client.get(url.clone()))
            .send()
            .await
            .map_err(|e| WebDavError::from_transport(&e, url.as_str()))?;

        let status = response.status().as_u16();
        trace!(status = status, url = %url, "GET");

        if status != 200 {
            return Err(WebDavError::from_status(status, "GET", url.as_str()));
        }

        let href = url.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            // the permit lives as long as the body stream
            let _held = &permit;
            chunk.map_err(|e| WebDavError::from_transport(&e, &href))
        });

        Ok(Box::pin(stream))
    }
}

/// Resolve the Location header of a redirect against the request URL
fn redirect_target(from: &Url, response: &Response) -> Result<Url, WebDavError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| WebDavError::from_status(MOVED_PERMANENTLY, "PROPFIND", from.as_str()))?;

    from.join(location)
        .map_err(|e| WebDavError::MalformedUrl(location.to_string(), e.to_string()))
}

/// Stream a local file in fixed-size chunks
fn file_stream(file: tokio::fs::File) -> ByteStream {
    let stream = futures::stream::try_unfold(file, |mut file| async move {
        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            return Ok(None);
        }
        buffer.truncate(read);
        Ok::<_, std::io::Error>(Some((Bytes::from(buffer), file)))
    });
    Box::pin(stream.map_err(WebDavError::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(credentials: Option<(String, String)>) -> WebDavClient {
        let options = ClientOptions {
            credentials,
            ..ClientOptions::default()
        };
        WebDavClient::new("http://jacs-webdav:8080/WebDAV", options).unwrap()
    }

    #[test]
    fn test_resolve_url_concatenates_standard_path() {
        let client = client(None);
        let url = client.resolve_url("/groups/scicomp/tile 1.tif").unwrap();
        assert_eq!(
            url.as_str(),
            "http://jacs-webdav:8080/WebDAV/groups/scicomp/tile%201.tif"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = WebDavClient::new("not a url", ClientOptions::default());
        assert!(matches!(result, Err(WebDavError::MalformedUrl(_, _))));
    }

    #[test]
    fn test_unique_upload_directory_paths() {
        let client = client(Some(("jdoe".to_string(), "secret".to_string())));

        let first = client.unique_upload_directory_path("/upload");
        let second = client.unique_upload_directory_path("/upload/");

        assert!(first.starts_with("/upload/"));
        assert!(first.ends_with("__jdoe__1/"));
        assert!(second.starts_with("/upload/"));
        assert!(!second.starts_with("/upload//"));
        assert!(second.ends_with("__jdoe__2/"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_anonymous_upload_directory_path() {
        let client = client(None);
        assert!(client
            .unique_upload_directory_path("/upload")
            .ends_with("__anonymous__1/"));
    }

    #[tokio::test]
    async fn test_file_stream_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..(UPLOAD_CHUNK_SIZE + 10)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let file = tokio::fs::File::open(&path).await.unwrap();
        let chunks: Vec<Bytes> = file_stream(file).try_collect().await.unwrap();

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(joined, content);
    }

    fn mock_client(server: &MockServer) -> WebDavClient {
        WebDavClient::new(&format!("{}/WebDAV", server.uri()), ClientOptions::default()).unwrap()
    }

    /// Multi-status body; a missing length marks a collection
    fn multistatus_body(responses: &[(&str, Option<u64>)]) -> String {
        let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:">"#);
        for (href, length) in responses {
            let props = match length {
                Some(len) => format!("<D:resourcetype/><D:getcontentlength>{}</D:getcontentlength>", len),
                None => "<D:resourcetype><D:collection/></D:resourcetype>".to_string(),
            };
            body.push_str(&format!(
                "<D:response><D:href>{}</D:href><D:propstat><D:prop>{}</D:prop>\
                 <D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>",
                href, props
            ));
        }
        body.push_str("</D:multistatus>");
        body
    }

    async fn mount_propfind(server: &MockServer, at: &str, response: ResponseTemplate) {
        Mock::given(method("PROPFIND"))
            .and(path(at))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn moved_to(location: &str) -> ResponseTemplate {
        ResponseTemplate::new(301).insert_header("Location", location)
    }

    #[tokio::test]
    async fn test_describe_follows_one_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("PROPFIND"))
            .and(path("/WebDAV/old.tif"))
            .respond_with(moved_to("/WebDAV/new.tif"))
            .expect(1)
            .mount(&server)
            .await;
        mount_propfind(
            &server,
            "/WebDAV/new.tif",
            ResponseTemplate::new(207).set_body_string(multistatus_body(&[("/WebDAV/new.tif", Some(10))])),
        )
        .await;
        let client = mock_client(&server);
        let url = client.resolve_url("/old.tif").unwrap();

        let remote = client.describe(&url).await.unwrap();

        assert_eq!(remote.url, url);
        assert!(!remote.is_directory);
        assert_eq!(remote.content_length, Some(10));
    }

    #[tokio::test]
    async fn test_second_redirect_is_a_loop() {
        let server = MockServer::start().await;
        mount_propfind(&server, "/WebDAV/a/", moved_to("/WebDAV/b/")).await;
        mount_propfind(&server, "/WebDAV/b/", moved_to("/WebDAV/c/")).await;
        let client = mock_client(&server);
        let url = client.resolve_url("/a/").unwrap();

        let err = client.describe(&url).await.unwrap_err();
        assert!(matches!(err, WebDavError::RedirectLoop(ref href) if href == url.as_str()));

        let err = client.list_files(&url, true).await.unwrap_err();
        assert!(matches!(err, WebDavError::RedirectLoop(_)));
    }

    #[tokio::test]
    async fn test_propfind_status_mapping() {
        let server = MockServer::start().await;
        mount_propfind(&server, "/WebDAV/secret.tif", ResponseTemplate::new(401)).await;
        mount_propfind(&server, "/WebDAV/locked.tif", ResponseTemplate::new(403)).await;
        mount_propfind(&server, "/WebDAV/broken.tif", ResponseTemplate::new(503)).await;
        mount_propfind(
            &server,
            "/WebDAV/empty/",
            ResponseTemplate::new(207).set_body_string(multistatus_body(&[])),
        )
        .await;
        let client = mock_client(&server);
        let describe = |p: &str| {
            let url = client.resolve_url(p).unwrap();
            let client = &client;
            async move { client.describe(&url).await.unwrap_err() }
        };

        assert!(matches!(describe("/missing.tif").await, WebDavError::NotFound(_)));
        assert!(matches!(describe("/secret.tif").await, WebDavError::Unauthorized(_)));
        assert!(matches!(describe("/locked.tif").await, WebDavError::Forbidden(_)));
        assert!(matches!(describe("/broken.tif").await, WebDavError::Server(503, _)));
        assert!(matches!(describe("/empty/").await, WebDavError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_is_available_accepts_multistatus_and_redirect() {
        let server = MockServer::start().await;
        mount_propfind(
            &server,
            "/WebDAV/here.tif",
            ResponseTemplate::new(207).set_body_string(multistatus_body(&[("/WebDAV/here.tif", Some(1))])),
        )
        .await;
        mount_propfind(&server, "/WebDAV/dir", moved_to("/WebDAV/dir/")).await;
        let client = mock_client(&server);

        let available = |p: &str| {
            let url = client.resolve_url(p).unwrap();
            let client = &client;
            async move { client.is_available(&url).await.unwrap() }
        };

        assert!(available("/here.tif").await);
        assert!(available("/dir").await);
        assert!(!available("/gone.tif").await);
    }

    #[tokio::test]
    async fn test_list_files_drops_collections() {
        let server = MockServer::start().await;
        let listing = multistatus_body(&[
            ("/WebDAV/d/", None),
            ("/WebDAV/d/a.tif", Some(2048)),
            ("/WebDAV/d/sub/", None),
            ("/WebDAV/d/sub/b.tif", Some(10)),
        ]);
        Mock::given(method("PROPFIND"))
            .and(path("/WebDAV/d/"))
            .and(header("Depth", "infinity"))
            .respond_with(ResponseTemplate::new(207).set_body_string(listing))
            .mount(&server)
            .await;
        Mock::given(method("PROPFIND"))
            .and(path("/WebDAV/d/"))
            .and(header("Depth", "1"))
            .respond_with(
                ResponseTemplate::new(207)
                    .set_body_string(multistatus_body(&[("/WebDAV/d/", None), ("/WebDAV/d/a.tif", Some(2048))])),
            )
            .mount(&server)
            .await;
        let client = mock_client(&server);
        let url = client.resolve_url("/d/").unwrap();

        let all = client.list_files(&url, true).await.unwrap();
        let paths: Vec<&str> = all.iter().map(|f| f.url.path()).collect();
        assert_eq!(paths, vec!["/WebDAV/d/a.tif", "/WebDAV/d/sub/b.tif"]);
        assert!(all.iter().all(|f| !f.is_directory));
        assert_eq!(all[0].content_length, Some(2048));

        let shallow = client.list_files(&url, false).await.unwrap();
        assert_eq!(shallow.len(), 1);
        assert_eq!(shallow[0].url.path(), "/WebDAV/d/a.tif");
    }

    #[tokio::test]
    async fn test_upload_accepts_created_or_no_content() {
        let server = MockServer::start().await;
        for (at, status) in [
            ("/WebDAV/new.bin", 201u16),
            ("/WebDAV/replaced.bin", 204),
            ("/WebDAV/odd.bin", 200),
            ("/WebDAV/full.bin", 507),
        ] {
            Mock::given(method("PUT"))
                .and(path(at))
                .and(body_string("payload"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }
        let client = mock_client(&server);
        let upload = |p: &str| {
            let url = client.resolve_url(p).unwrap();
            let client = &client;
            async move {
                let chunks: Vec<Result<Bytes, WebDavError>> = vec![Ok(Bytes::from_static(b"payload"))];
                client.upload(&url, Box::pin(futures::stream::iter(chunks))).await
            }
        };

        assert!(upload("/new.bin").await.is_ok());
        assert!(upload("/replaced.bin").await.is_ok());
        assert!(matches!(
            upload("/odd.bin").await,
            Err(WebDavError::UnexpectedStatus { status: 200, .. })
        ));
        assert!(matches!(upload("/full.bin").await, Err(WebDavError::Server(507, _))));
    }

    #[tokio::test]
    async fn test_upload_file_streams_local_content() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/WebDAV/up/data.txt"))
            .and(body_string("local content"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("data.txt");
        std::fs::write(&local, "local content").unwrap();
        let client = mock_client(&server);

        let url = client.resolve_url("/up/data.txt").unwrap();
        client.upload_file(&url, &local).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_directory_rejects_existing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("MKCOL"))
            .and(path("/WebDAV/upload/fresh/"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("MKCOL"))
            .and(path("/WebDAV/upload/taken/"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        let client = mock_client(&server);

        let fresh = client.resolve_url("/upload/fresh/").unwrap();
        client.create_directory(&fresh).await.unwrap();

        let taken = client.resolve_url("/upload/taken/").unwrap();
        let err = client.create_directory(&taken).await.unwrap_err();
        assert!(matches!(err, WebDavError::UnexpectedStatus { status: 405, .. }));
    }

    #[tokio::test]
    async fn test_open_streams_body() {
        let server = MockServer::start().await;
        let content: Vec<u8> = (0..5000).map(|i| (i % 7) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/WebDAV/tile.tif"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
            .mount(&server)
            .await;
        let client = mock_client(&server);

        let url = client.resolve_url("/tile.tif").unwrap();
        let chunks: Vec<Bytes> = client.open(&url).await.unwrap().try_collect().await.unwrap();
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(joined, content);

        let missing = client.resolve_url("/missing.tif").unwrap();
        assert!(matches!(client.open(&missing).await, Err(WebDavError::NotFound(_))));
    }
}
