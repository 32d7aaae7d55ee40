//! Page paths and their resolution against the web root.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::WindowError;

/// Well-known pages of the local web UI, relative to the web root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pages {
    /// Shown while the shell starts.
    pub loading: String,
    /// Shown once startup completes.
    pub home: String,
    /// Diagnostic page shown after a captured failure.
    pub error: String,
    /// Target of the `/errorSummary` redirect.
    pub error_summary: String,
}

impl Default for Pages {
    fn default() -> Self {
        Self {
            loading: "/web/load/loading.html".to_string(),
            home: "/web/home/index.html".to_string(),
            error: "/web/error/errorPage.html".to_string(),
            error_summary: "/error/errorDetails.html".to_string(),
        }
    }
}

/// Turns page paths into URLs the embedded view can load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResolver {
    root: PathBuf,
}

impl PageResolver {
    /// Resolves pages against `root`, made absolute against the working
    /// directory if it is relative.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    /// Resolves pages against the working directory.
    pub fn current_dir() -> io::Result<Self> {
        Self::new(std::env::current_dir()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `page` to a URL.
    ///
    /// Absolute URLs (`about:blank`, `http://...`) pass through unchanged;
    /// anything else is a path under the web root.
    pub fn resolve(&self, page: &str) -> Result<Url, WindowError> {
        if let Ok(url) = Url::parse(page) {
            // A single-letter scheme is a Windows drive, not a URL.
            if url.scheme().len() > 1 {
                return Ok(url);
            }
        }

        let path = self.root.join(page.trim_start_matches(['/', '\\']));
        Url::from_file_path(&path).map_err(|()| WindowError::InvalidPage(page.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_to_root() {
        let root = std::env::temp_dir().join("kiosk-web");
        let resolver = PageResolver::new(&root).unwrap();

        let url = resolver.resolve("/web/home/index.html").unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(
            url.to_file_path().unwrap(),
            root.join("web").join("home").join("index.html")
        );
    }

    #[test]
    fn test_absolute_urls_pass_through() {
        let resolver = PageResolver::current_dir().unwrap();

        assert_eq!(resolver.resolve("about:blank").unwrap().as_str(), "about:blank");
        assert_eq!(
            resolver.resolve("http://127.0.0.1:7070/errors").unwrap().as_str(),
            "http://127.0.0.1:7070/errors"
        );
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let resolver = PageResolver::new("site").unwrap();
        assert!(resolver.root().is_absolute());
        assert!(resolver.root().ends_with("site"));
    }

    #[test]
    fn test_default_pages() {
        let pages = Pages::default();
        assert_eq!(pages.loading, "/web/load/loading.html");
        assert_eq!(pages.home, "/web/home/index.html");
        assert_eq!(pages.error, "/web/error/errorPage.html");
    }
}
