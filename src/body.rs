use std::fmt;
use std::io::{Read, Write};

use bytes::Bytes;
use serde::Serialize;

use crate::Result;
use crate::error::Error;

pub(crate) const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Largest buffer a response body can be collected into.
pub(crate) const MAX_BUFFERED_BODY_BYTES: usize = isize::MAX as usize;

const READ_CHUNK_BYTES: usize = 8192;

/// Outgoing payload of a request.
///
/// Content is held as [`Bytes`] so retries and redirects replay the same body
/// without copying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBody {
    content_type: String,
    content: Option<Bytes>,
}

impl RequestBody {
    pub fn from_bytes(content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            content: Some(content.into()),
        }
    }

    /// UTF-8 text; `; charset=utf-8` is appended when the content type names no charset.
    pub fn from_text(content_type: impl Into<String>, text: impl Into<String>) -> Self {
        let mut content_type = content_type.into();
        if !content_type.to_ascii_lowercase().contains("charset") {
            content_type.push_str("; charset=utf-8");
        }
        Self::from_bytes(content_type, text.into())
    }

    /// A body with no content and an unknown length.
    pub fn empty(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content: None,
        }
    }

    /// Url-encodes `pairs` as form content. An empty pair list yields `None`:
    /// there is no body to send, and callers must handle that case.
    pub fn form<I, K, V>(content_type: impl Into<String>, pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(pairs);
        let encoded = serializer.finish();
        if encoded.is_empty() {
            return None;
        }
        Some(Self::from_text(content_type, encoded))
    }

    pub fn json<T>(payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let body =
            serde_json::to_vec(payload).map_err(|source| Error::SerializeJson { source })?;
        Ok(Self::from_bytes(DEFAULT_CONTENT_TYPE, body))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// `None` when the length is unknown and the body has to be streamed chunked.
    pub fn content_length(&self) -> Option<u64> {
        self.content.as_ref().map(|content| content.len() as u64)
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn write_to(&self, sink: &mut dyn Write) -> std::io::Result<()> {
        if let Some(content) = &self.content {
            sink.write_all(content)?;
        }
        Ok(())
    }

    pub fn string_content(&self) -> String {
        self.content
            .as_ref()
            .map(|content| String::from_utf8_lossy(content).into_owned())
            .unwrap_or_default()
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::from_bytes(DEFAULT_CONTENT_TYPE, Bytes::new())
    }
}

/// Incoming payload of a response.
///
/// The byte source is read lazily. [`ResponseBody::bytes`] drains it once and
/// caches the result; [`ResponseBody::byte_stream`] hands out the raw reader for
/// payloads that should not be buffered.
pub struct ResponseBody {
    content_type: Option<String>,
    content_length: Option<u64>,
    source: Option<Box<dyn Read + Send>>,
    cached: Option<Bytes>,
    failure: Option<ReadFailure>,
    limit: usize,
}

/// A failed read, replayed on every later read of the same body.
#[derive(Clone, Debug)]
enum ReadFailure {
    TooLarge { limit_bytes: usize, actual_bytes: u64 },
    Io { kind: std::io::ErrorKind, message: String },
}

impl ReadFailure {
    fn from_error(error: &Error) -> Option<Self> {
        match error {
            Error::ResponseBodyTooLarge {
                limit_bytes,
                actual_bytes,
            } => Some(Self::TooLarge {
                limit_bytes: *limit_bytes,
                actual_bytes: *actual_bytes,
            }),
            Error::ReadBody { source } => Some(Self::Io {
                kind: source.kind(),
                message: source.to_string(),
            }),
            _ => None,
        }
    }

    fn to_error(&self) -> Error {
        match self {
            Self::TooLarge {
                limit_bytes,
                actual_bytes,
            } => Error::ResponseBodyTooLarge {
                limit_bytes: *limit_bytes,
                actual_bytes: *actual_bytes,
            },
            Self::Io { kind, message } => Error::ReadBody {
                source: std::io::Error::new(*kind, message.clone()),
            },
        }
    }
}

impl ResponseBody {
    pub fn new(
        content_type: Option<String>,
        content_length: Option<u64>,
        source: Box<dyn Read + Send>,
    ) -> Self {
        Self {
            content_type,
            content_length,
            source: Some(source),
            cached: None,
            failure: None,
            limit: MAX_BUFFERED_BODY_BYTES,
        }
    }

    /// An already-buffered body, e.g. one synthesized by an interceptor.
    pub fn from_bytes(content_type: Option<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            content_type,
            content_length: Some(content.len() as u64),
            source: None,
            cached: Some(content),
            failure: None,
            limit: MAX_BUFFERED_BODY_BYTES,
        }
    }

    pub fn empty() -> Self {
        Self::from_bytes(None, Bytes::new())
    }

    /// Caps how many bytes [`ResponseBody::bytes`] may buffer.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none() && self.cached.is_none()
    }

    /// The unread byte source, if the body has not been buffered or closed.
    pub fn byte_stream(&mut self) -> Option<&mut (dyn Read + Send + 'static)> {
        self.source.as_deref_mut()
    }

    /// Buffers the body. A failed read leaves the body failed: later calls
    /// return the same error instead of whatever was left of the stream.
    pub fn bytes(&mut self) -> Result<&Bytes> {
        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }
        let content = match self.cached.take() {
            Some(content) => content,
            None => self.read_source().inspect_err(|error| {
                self.failure = ReadFailure::from_error(error);
            })?,
        };
        Ok(self.cached.insert(content))
    }

    /// Buffers the body and decodes it as UTF-8, replacing invalid sequences.
    pub fn string(&mut self) -> Result<String> {
        let content = self.bytes()?;
        Ok(String::from_utf8_lossy(content).into_owned())
    }

    /// Streams the body into `writer` without buffering it, then closes the source.
    pub fn copy_to<W>(&mut self, writer: &mut W) -> Result<u64>
    where
        W: Write + ?Sized,
    {
        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }
        if let Some(cached) = &self.cached {
            writer
                .write_all(cached)
                .and_then(|()| writer.flush())
                .map_err(|source| Error::ReadBody { source })?;
            return Ok(cached.len() as u64);
        }
        let Some(mut source) = self.source.take() else {
            return Ok(0);
        };
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        let mut copied = 0_u64;
        loop {
            let read = source.read(&mut chunk).map_err(|source| {
                let error = Error::ReadBody { source };
                self.failure = ReadFailure::from_error(&error);
                error
            })?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&chunk[..read])
                .map_err(|source| Error::ReadBody { source })?;
            copied = copied.saturating_add(read as u64);
        }
        writer.flush().map_err(|source| Error::ReadBody { source })?;
        Ok(copied)
    }

    /// Releases the byte source. Idempotent; the cached buffer, if any, survives.
    pub fn close(&mut self) {
        // Dropping the reader closes the underlying stream; failures there are not observable.
        self.source = None;
    }

    fn read_source(&mut self) -> Result<Bytes> {
        if let Some(declared) = self.content_length
            && declared > self.limit as u64
        {
            return Err(Error::ResponseBodyTooLarge {
                limit_bytes: self.limit,
                actual_bytes: declared,
            });
        }
        let Some(mut source) = self.source.take() else {
            return Ok(Bytes::new());
        };

        let capacity = self
            .content_length
            .map_or(0, |declared| declared.min(64 * 1024) as usize);
        let mut collected = Vec::with_capacity(capacity);
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        loop {
            let read = source
                .read(&mut chunk)
                .map_err(|source| Error::ReadBody { source })?;
            if read == 0 {
                break;
            }
            if collected.len().saturating_add(read) > self.limit {
                return Err(Error::ResponseBodyTooLarge {
                    limit_bytes: self.limit,
                    actual_bytes: (collected.len() + read) as u64,
                });
            }
            collected.extend_from_slice(&chunk[..read]);
        }
        Ok(Bytes::from(collected))
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("buffered", &self.cached.as_ref().map(Bytes::len))
            .field("open", &self.source.is_some())
            .field("failed", &self.failure.is_some())
            .finish()
    }
}
