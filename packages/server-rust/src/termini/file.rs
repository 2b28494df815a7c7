use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indirector_core::{Format, Model, Request};
use tracing::debug;

use super::{validate_key, KeyPattern};
use crate::error::{IndirectorError, IndirectorResult};
use crate::fsutil;
use crate::indirector::Terminus;

/// Flat-file store: one file per instance at `<root>/<indirection>/<key>.<ext>`.
///
/// Writes are atomic and last write wins. Keys are validated before any
/// filesystem access.
pub struct FileTerminus<M: Model> {
    name: &'static str,
    dir: PathBuf,
    format: Format,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> FileTerminus<M> {
    #[must_use]
    pub fn new(name: &'static str, root: impl AsRef<Path>, format: Format) -> Self {
        Self {
            name,
            dir: root.as_ref().join(M::INDIRECTION.as_str()),
            format,
            _model: PhantomData,
        }
    }

    /// Directory holding this indirection's files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for `key`, after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`IndirectorError::InvalidKey`] for keys unusable as file names.
    pub fn path(&self, key: &str) -> IndirectorResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.{}", self.format.extension())))
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for FileTerminus<M> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        let path = self.path(request.key())?;
        match fsutil::read_optional(&path).await? {
            Some(bytes) => Ok(Some(self.format.intern(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        let pattern = KeyPattern::parse(request.key())?;
        let mut found = Vec::new();
        for key in fsutil::list_stems(&self.dir, self.format.extension()).await? {
            if !pattern.matches(&key) {
                continue;
            }
            // A file removed between listing and reading is skipped.
            if let Some(bytes) = fsutil::read_optional(&self.path(&key)?).await? {
                found.push(self.format.intern(&bytes)?);
            }
        }
        Ok(found)
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<()> {
        let path = self.path(request.key())?;
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::state(format!("{request} carries no instance"))
        })?;
        let bytes = self.format.render(instance)?;
        fsutil::atomic_write(&path, &bytes).await?;
        debug!(path = %path.display(), "wrote {}", M::INDIRECTION);
        Ok(())
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<()> {
        let path = self.path(request.key())?;
        if fsutil::remove_if_exists(&path).await? {
            debug!(path = %path.display(), "removed {}", M::INDIRECTION);
        }
        Ok(())
    }
}
