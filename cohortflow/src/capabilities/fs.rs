//! Filesystem-backed fetch and persist capabilities.

use super::{Fetcher, Persister};
use crate::core::{Artifact, StoredArtifact, TransformedArtifact, WorkUnit};
use crate::errors::{FetchError, PersistError};
use crate::utils::fingerprint;
use async_trait::async_trait;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::trace;

#[allow(clippy::expect_used)]
static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid literal pattern"));

const FINGERPRINT_LEN: usize = 12;

/// Reads payloads from the local filesystem.
///
/// Accepts plain paths and `file://` references. Relative paths are resolved
/// against the configured root, if any.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    /// Creates a fetcher that resolves relative paths against the working
    /// directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory relative paths are resolved against.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn resolve(&self, unit: &WorkUnit) -> Result<PathBuf, FetchError> {
        let reference = unit.reference();
        let raw = match reference.strip_prefix("file://") {
            Some(path) => path,
            None if reference.contains("://") => {
                return Err(FetchError::Unsupported(reference.to_string()));
            }
            None => reference,
        };

        let path = Path::new(raw);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, unit: &WorkUnit) -> Result<Artifact, FetchError> {
        let path = self.resolve(unit)?;
        trace!(path = %path.display(), "Reading source file");

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Artifact::new(unit.clone(), bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FetchError::NotFound(unit.reference().to_string()))
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

/// Writes transformed artifacts under a root directory.
///
/// Layout: `<root>/<transform>/<fingerprint>-<name>`, where the fingerprint
/// is derived from the full source reference and `name` is the sanitized last
/// segment of it. Two sources with the same file name therefore never
/// collide.
#[derive(Debug, Clone)]
pub struct FilePersister {
    root: PathBuf,
}

impl FilePersister {
    /// Creates a persister writing under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path `artifact` is written to.
    #[must_use]
    pub fn location_for(&self, artifact: &TransformedArtifact) -> PathBuf {
        let origin = artifact.origin();
        let name = sanitize(origin.file_name().unwrap_or("artifact"));
        let file = format!("{}-{name}", fingerprint(origin.reference(), FINGERPRINT_LEN));
        self.root.join(sanitize(artifact.transform())).join(file)
    }
}

fn sanitize(segment: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(segment, "_");
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        name => name.to_string(),
    }
}

#[async_trait]
impl Persister for FilePersister {
    async fn persist(&self, artifact: &TransformedArtifact) -> Result<StoredArtifact, PersistError> {
        let path = self.location_for(artifact);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, artifact.payload()).await?;
        trace!(path = %path.display(), size = artifact.payload().len(), "Wrote artifact");

        Ok(StoredArtifact::new(artifact, path.display().to_string()))
    }
}
