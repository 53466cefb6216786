use crate::core::model::JobId;
use anyhow::Context;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;

const STAGING_DIR: &str = ".staging";
const MAX_STEM_CHARS: usize = 200;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("path escapes the download directory: {0}")]
    PathViolation(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat directory holding finished artifacts.
///
/// In-flight downloads live under a hidden per-job staging directory and are
/// renamed into the root only once complete.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub async fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create download dir {}", root.display()))?;
        let root = tokio::fs::canonicalize(&root)
            .await
            .with_context(|| format!("canonicalize {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a requested name to a path directly inside the root.
    ///
    /// The name must be a single ordinary, non-hidden path component.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let violation = || StoreError::PathViolation(name.to_string());

        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
            return Err(violation());
        }
        let mut comps = Path::new(name).components();
        match (comps.next(), comps.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(name)),
            _ => Err(violation()),
        }
    }

    /// Opens a finished artifact for streaming, returning it with its length.
    pub async fn open_artifact(&self, name: &str) -> Result<(File, u64), StoreError> {
        let path = self.resolve(name)?;

        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        // symlinks must not lead out of the root either
        let real = tokio::fs::canonicalize(&path).await?;
        let real_root = tokio::fs::canonicalize(&self.root).await?;
        if !real.starts_with(&real_root) {
            return Err(StoreError::PathViolation(name.to_string()));
        }

        let file = File::open(&real).await?;
        Ok((file, meta.len()))
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(p) => tokio::fs::metadata(p).await.map(|m| m.is_file()).unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn staging_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(STAGING_DIR).join(job_id.to_string())
    }

    pub async fn create_staging(&self, job_id: JobId) -> anyhow::Result<PathBuf> {
        let dir = self.staging_dir(job_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create staging dir {}", dir.display()))?;
        Ok(dir)
    }

    pub async fn discard_staging(&self, job_id: JobId) {
        let dir = self.staging_dir(job_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to remove staging dir");
            }
        }
    }

    /// Moves a staged file into the root under `name`, replacing any
    /// previous artifact of that name.
    pub async fn promote(&self, staged: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let target = self.resolve(name)?;
        if self.exists(name).await {
            tracing::info!(file = %name, "replacing existing artifact");
            tokio::fs::remove_file(&target)
                .await
                .with_context(|| format!("remove previous {}", target.display()))?;
        }
        tokio::fs::rename(staged, &target)
            .await
            .with_context(|| format!("move {} -> {}", staged.display(), target.display()))?;
        Ok(target)
    }
}

/// Turns an arbitrary media title into a safe single-component file stem.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = sanitize_filename::sanitize(title)
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.').trim();
    let stem: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    if stem.is_empty() {
        "download".to_string()
    } else {
        stem
    }
}

/// Replaces the extension of `file_name`, or appends one if missing.
pub fn with_container(file_name: &str, container: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    format!("{}.{}", stem, container)
}
