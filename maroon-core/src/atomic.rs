//! Whole-file replacement through a staged temporary file.
//!
//! The replacement content is written to a [`NamedTempFile`] in a scratch
//! directory, synced, and then moved over the target by a [`Replace`] strategy:
//!
//! - [`RenameReplace`] renames the staged file onto the target. Readers see
//!   either the old or the new file, never a mixture.
//! - [`CopyReplace`] truncates the target and copies the staged bytes into it.
//!   This works across filesystem volumes but is best-effort: a reader racing
//!   the copy, or a crash during it, can observe a partially written target.
//!
//! [`FileReplacer`] tries its primary strategy and falls back to the second
//! one only when the first fails. The staged file is removed on every path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Moves a fully written staged file over a target path.
pub trait Replace: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Make `target` hold the contents of `staged`.
    fn replace(&self, staged: &Path, target: &Path) -> io::Result<()>;
}

/// Atomic rename of the staged file onto the target.
///
/// Fails when the two paths are on different volumes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameReplace;

impl Replace for RenameReplace {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn replace(&self, staged: &Path, target: &Path) -> io::Result<()> {
        fs::rename(staged, target)
    }
}

/// Truncate-and-copy into the target. Not atomic.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyReplace;

impl Replace for CopyReplace {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn replace(&self, staged: &Path, target: &Path) -> io::Result<()> {
        let mut source = File::open(staged)?;
        let mut destination = open_owner_only(
            target,
            OpenOptions::new().write(true).create(true).truncate(true),
        )?;
        io::copy(&mut source, &mut destination)?;
        destination.sync_all()
    }
}

/// Which strategy committed a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Committed {
    /// The primary strategy succeeded.
    Atomic,
    /// The primary strategy failed and the fallback copy was used.
    BestEffort,
}

/// Replaces files by staging their new content in a scratch directory.
pub struct FileReplacer {
    scratch_dir: PathBuf,
    primary: Box<dyn Replace>,
    fallback: Box<dyn Replace>,
}

impl FileReplacer {
    /// Rename first, copy if the rename fails.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self::with_strategies(scratch_dir, Box::new(RenameReplace), Box::new(CopyReplace))
    }

    pub fn with_strategies(
        scratch_dir: impl Into<PathBuf>,
        primary: Box<dyn Replace>,
        fallback: Box<dyn Replace>,
    ) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            primary,
            fallback,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Replace the contents of `target` with `contents`.
    pub fn replace(&self, target: &Path, contents: &[u8]) -> io::Result<Committed> {
        let mut staged = NamedTempFile::new_in(&self.scratch_dir)?;
        staged.write_all(contents)?;
        staged.as_file().sync_all()?;

        // Closes the handle before the swap; the path is still removed on drop.
        let staged = staged.into_temp_path();

        match self.primary.replace(&staged, target) {
            Ok(()) => {
                tracing::debug!("Replaced {:?} via {}", target, self.primary.name());
                Ok(Committed::Atomic)
            }
            Err(e) => {
                tracing::warn!(
                    "{} of {:?} failed ({}), falling back to {}",
                    self.primary.name(),
                    target,
                    e,
                    self.fallback.name()
                );
                self.fallback.replace(&staged, target)?;
                Ok(Committed::BestEffort)
            }
        }
    }
}

impl std::fmt::Debug for FileReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReplacer")
            .field("scratch_dir", &self.scratch_dir)
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

/// Open `path` with the given options, creating it readable and writable by
/// the owner only.
pub(crate) fn open_owner_only(path: &Path, options: &mut OpenOptions) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
