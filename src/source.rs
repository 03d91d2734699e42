use std::fmt;
use std::path::{Path, PathBuf};

/// An input document: a local file or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Url(String),
}

impl Source {
    /// Normalizes a command-line argument. `http(s)://` stays a URL,
    /// `file://` and bare paths become absolute file paths.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Source::Url(raw.to_string());
        }
        let path = raw.strip_prefix("file://").unwrap_or(raw);
        Source::File(absolutize(Path::new(path)))
    }

    pub fn url(&self) -> String {
        match self {
            Source::File(path) => format!("file://{}", path.display()),
            Source::Url(url) => url.clone(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
