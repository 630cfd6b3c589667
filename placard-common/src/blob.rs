//! Blob storage for locally uploaded media
//!
//! Media items reference their content through a locator string. Remote
//! content uses plain `http(s)://` URLs, small inline content rides along
//! as `data:` URLs inside the catalog itself, and locally uploaded files
//! are stored out-of-band under a `local:<key>` locator so the state store
//! never has to hold multi-megabyte payloads.

use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A parsed content locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    /// Remote content fetched over HTTP(S); the full URL
    Http(&'a str),
    /// Inline `data:` URL; the full URL
    Data(&'a str),
    /// Locally stored blob; the key only
    Local(&'a str),
}

impl<'a> Locator<'a> {
    pub fn parse(src: &'a str) -> Result<Self> {
        let lower = |n: usize| src.get(..n).map(|p| p.to_ascii_lowercase());
        if lower(7).as_deref() == Some("http://") || lower(8).as_deref() == Some("https://") {
            return Ok(Locator::Http(src));
        }
        if lower(5).as_deref() == Some("data:") {
            return Ok(Locator::Data(src));
        }
        if let Some(key) = src.strip_prefix("local:") {
            if key.is_empty() {
                return Err(Error::InvalidLocator("empty local key".to_string()));
            }
            return Ok(Locator::Local(key));
        }
        Err(Error::InvalidLocator(format!(
            "unsupported scheme in '{src}'"
        )))
    }
}

/// Decoded contents of a `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Media type from the header, `text/plain` when unspecified
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Decode a `data:[<mediatype>][;base64],<data>` URL.
pub fn parse_data_url(url: &str) -> Result<DataUrl> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidLocator("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidLocator("data URL has no comma".to_string()))?;

    let (media_type, is_base64) = match header.strip_suffix(";base64") {
        Some(mt) => (mt, true),
        None => (header, false),
    };
    let media_type = if media_type.is_empty() {
        "text/plain".to_string()
    } else {
        media_type.to_string()
    };

    let bytes = if is_base64 {
        STANDARD
            .decode(payload)
            .map_err(|e| Error::InvalidLocator(format!("bad base64 payload: {e}")))?
    } else {
        percent_decode(payload)?
    };

    Ok(DataUrl { media_type, bytes })
}

fn percent_decode(payload: &str) -> Result<Vec<u8>> {
    let raw = payload.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'%' => {
                let hex = raw
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        Error::InvalidLocator("truncated percent escape".to_string())
                    })?;
                out.push(hex);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Storage for blobs referenced by `local:<key>` locators
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Blob store backed by one file per key in a flat directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys become file names, so only a conservative charset is allowed.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let ok = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !ok {
            return Err(Error::InvalidInput(format!("invalid blob key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored blob '{}' ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
