//! WebDAV types and multi-status parsing
//!
//! Defines the immutable descriptor of a remote resource and converts
//! PROPFIND multi-status bodies into descriptors.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use url::Url;

use super::errors::WebDavError;

/// Properties requested for every listing/describe PROPFIND
pub const PROPFIND_FILE_PROPERTIES: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8"?>"#,
    r#"<D:propfind xmlns:D="DAV:"><D:prop>"#,
    r#"<D:resourcetype/><D:getcontentlength/>"#,
    r#"</D:prop></D:propfind>"#
);

/// Minimal PROPFIND used for availability checks
pub const PROPFIND_RESOURCE_TYPE_ONLY: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8"?>"#,
    r#"<D:propfind xmlns:D="DAV:"><D:prop>"#,
    r#"<D:resourcetype/>"#,
    r#"</D:prop></D:propfind>"#
);

const ONE_KILOBYTE: u64 = 1024;

/// PROPFIND traversal depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource itself
    Zero,
    /// The resource and its immediate members
    One,
    /// The resource and every descendant
    Infinity,
}

impl Depth {
    /// Value for the `Depth` request header
    pub fn header_value(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// Immutable metadata snapshot of a remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Remote locator
    pub url: Url,
    /// Whether the resource is a collection
    pub is_directory: bool,
    /// Byte length (None for directories or when the server omits it)
    pub content_length: Option<u64>,
}

impl RemoteFile {
    /// Descriptor for a plain file
    pub fn file(url: Url, content_length: u64) -> Self {
        Self {
            url,
            is_directory: false,
            content_length: Some(content_length),
        }
    }

    /// Descriptor for a collection
    pub fn directory(url: Url) -> Self {
        Self {
            url,
            is_directory: true,
            content_length: None,
        }
    }

    /// Remote size rounded up to the nearest kilobyte, if known
    pub fn kilobytes(&self) -> Option<u64> {
        self.content_length.map(|len| len.div_ceil(ONE_KILOBYTE))
    }
}

impl std::fmt::Display for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_directory {
            write!(f, "{} (directory)", self.url)
        } else {
            match self.content_length {
                Some(len) => write!(f, "{} ({} bytes)", self.url, len),
                None => write!(f, "{}", self.url),
            }
        }
    }
}

/// One `<response>` element while it is being parsed
#[derive(Default)]
struct PartialResponse {
    href: Option<String>,
    is_directory: bool,
    content_length: Option<u64>,
}

/// Parse a PROPFIND multi-status body into descriptors.
///
/// Hrefs are resolved against `request_url`, so both absolute paths and
/// fully qualified URLs are accepted. Namespace prefixes are ignored.
pub fn parse_multistatus(request_url: &Url, body: &str) -> Result<Vec<RemoteFile>, WebDavError> {
    let malformed = |reason: String| WebDavError::MalformedResponse {
        href: request_url.to_string(),
        reason,
    };

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<PartialResponse> = None;
    let mut files = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"response" {
                    current = Some(PartialResponse::default());
                }
                if name == b"collection" && stack.last().map(Vec::as_slice) == Some(&b"resourcetype"[..]) {
                    if let Some(response) = current.as_mut() {
                        response.is_directory = true;
                    }
                }
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection"
                    && stack.last().map(Vec::as_slice) == Some(&b"resourcetype"[..])
                {
                    if let Some(response) = current.as_mut() {
                        response.is_directory = true;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(e.to_string()))?
                    .into_owned();
                let Some(response) = current.as_mut() else {
                    continue;
                };
                match stack.last().map(Vec::as_slice) {
                    Some(b"href") if stack.len() >= 2 && stack[stack.len() - 2] == b"response" => {
                        response.href = Some(text);
                    }
                    Some(b"getcontentlength") => {
                        let len = text
                            .trim()
                            .parse::<u64>()
                            .map_err(|e| malformed(format!("bad getcontentlength '{}': {}", text, e)))?;
                        response.content_length = Some(len);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                stack.pop();
                if e.local_name().as_ref() == b"response" {
                    if let Some(response) = current.take() {
                        files.push(finish_response(request_url, response).map_err(&malformed)?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e.to_string())),
            _ => {}
        }
    }

    Ok(files)
}

fn finish_response(request_url: &Url, response: PartialResponse) -> Result<RemoteFile, String> {
    let href = response
        .href
        .ok_or_else(|| "response without href".to_string())?;
    let url = request_url
        .join(&href)
        .map_err(|e| format!("bad href '{}': {}", href, e))?;

    if response.is_directory {
        Ok(RemoteFile::directory(url))
    } else {
        Ok(RemoteFile {
            url,
            is_directory: false,
            content_length: response.content_length,
        })
    }
}
