use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Create `dir` and its parents. An existing directory is not an error.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))
}

/// Write `bytes` to `dest` so that readers only ever see the previous file or
/// the complete new one.
///
/// The data goes to a temporary file next to `dest`, is synced, then renamed
/// over it. On error the temporary file is removed and `dest` is untouched.
pub fn publish_atomically(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write temporary file for {}", dest.display()))?;
    tmp.flush()?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temporary file for {}", dest.display()))?;

    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to publish {}", dest.display()))?;
    Ok(())
}
