use std::fs::File;
use std::io::{SeekFrom, Write};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::{PartPlan, TransferError};

// ---------------------------------------------------------------------------
// Ranged part reads
// ---------------------------------------------------------------------------

/// Reads one planned part of `path` into memory.
///
/// Each call opens its own handle so concurrent workers never share a file
/// cursor. A file that shrank since planning surfaces as `UnexpectedEof`.
pub async fn read_part(
    path: &Path,
    plan: &PartPlan,
    part_number: u32,
) -> Result<Vec<u8>, TransferError> {
    let len = plan.part_len(part_number);
    if len == 0 {
        return Err(TransferError::PartSetMismatch(format!(
            "part {part_number} is outside a plan of {} parts",
            plan.num_parts
        )));
    }

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(plan.part_offset(part_number)))
        .await?;

    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// BlockWriter
// ---------------------------------------------------------------------------

/// Writes downloaded blocks into a temp file beside the destination, then
/// moves it over the destination once the size checks out.
pub struct BlockWriter {
    temp: NamedTempFile,
    written: u64,
}

impl BlockWriter {
    /// Creates the temp file in `dest`'s directory.
    ///
    /// The temp file gets the permission bits a normally created file would
    /// get in that directory, so the process umask is honored even though
    /// `NamedTempFile` itself creates files owner-only.
    pub fn create_beside(dest: &Path) -> Result<Self, TransferError> {
        let dir = parent_dir(dest);
        std::fs::create_dir_all(&dir)?;

        let temp = NamedTempFile::new_in(&dir)?;
        apply_default_permissions(&dir, temp.as_file())?;

        Ok(Self { temp, written: 0 })
    }

    /// Appends a block that must start exactly where the previous one ended.
    pub fn write_block(&mut self, offset: u64, data: &[u8]) -> Result<(), TransferError> {
        if offset != self.written {
            return Err(TransferError::SizeMismatch {
                expected: self.written,
                actual: offset,
            });
        }
        self.temp.as_file_mut().write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path of the temp file (removed automatically if never persisted).
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Verifies the byte count and atomically renames over `dest`.
    ///
    /// On a mismatch the temp file is dropped and `dest` is left untouched.
    pub fn finish(mut self, expected: u64, dest: &Path) -> Result<PathBuf, TransferError> {
        if self.written != expected {
            return Err(TransferError::SizeMismatch {
                expected,
                actual: self.written,
            });
        }
        self.temp.as_file_mut().sync_all()?;
        let written = self.written;
        self.temp
            .persist(dest)
            .map_err(|e| TransferError::Io(e.error))?;
        debug!(path = %dest.display(), bytes = written, "persisted download");
        Ok(dest.to_path_buf())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(unix)]
fn apply_default_permissions(dir: &Path, target: &File) -> Result<(), TransferError> {
    // The umask cannot be read without changing it, so observe its effect
    // on a throwaway sibling created with the regular open path.
    static PROBE_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = PROBE_SEQ.fetch_add(1, Ordering::Relaxed);
    let probe_path = dir.join(format!(".cirrus-perm-probe-{}-{seq}", std::process::id()));
    let probe = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe_path)?;
    let perms = probe.metadata()?.permissions();
    drop(probe);
    std::fs::remove_file(&probe_path)?;

    target.set_permissions(perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_default_permissions(_dir: &Path, _target: &File) -> Result<(), TransferError> {
    Ok(())
}
