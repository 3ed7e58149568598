//! Static resources served by wildcard routes.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Bytes and content type of a found resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Raw content.
    pub bytes: Vec<u8>,
    /// MIME type.
    pub content_type: String,
}

/// Looks up resources by path relative to a mount point.
///
/// A `None` makes the route behave as if it had not matched. Fetches may
/// block: the dispatcher runs them on tokio's blocking pool when a runtime
/// is available.
pub trait ResourceProvider: Send + Sync {
    /// Fetches the resource at `path` (no leading slash).
    fn fetch(&self, path: &str) -> io::Result<Option<Resource>>;

    /// Resource served when the path is empty (the mount root itself).
    fn index(&self) -> &str {
        "index.html"
    }
}

/// Resources read from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    base_dir: PathBuf,
}

impl DirectoryResources {
    /// Serves files under `base`.
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
        }
    }

    /// Root directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Maps a relative URL path inside the base directory, refusing anything
    /// that would leave it.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }
}

impl ResourceProvider for DirectoryResources {
    fn fetch(&self, path: &str) -> io::Result<Option<Resource>> {
        let path = if path.is_empty() { self.index() } else { path };
        let Some(file) = self.map_path(path) else {
            return Ok(None);
        };
        if !file.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&file)?;
        Ok(Some(Resource {
            bytes,
            content_type: content_type(&file).to_string(),
        }))
    }
}

/// Resources held in memory, mostly useful for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryResources {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file.
    #[must_use]
    pub fn file(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.trim_start_matches('/').to_string(), bytes.into());
        self
    }
}

impl ResourceProvider for MemoryResources {
    fn fetch(&self, path: &str) -> io::Result<Option<Resource>> {
        let path = if path.is_empty() { self.index() } else { path };
        Ok(self.files.get(path).map(|bytes| Resource {
            bytes: bytes.clone(),
            content_type: content_type(Path::new(path)).to_string(),
        }))
    }
}

/// Guesses a MIME type from a file extension.
pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "text/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
