//! Whole-directory copy and delete for world directories.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Recursively copy `src` into `dst`. Returns the number of files copied.
///
/// Each directory is created before anything is copied into it. Existing
/// files at the destination are overwritten.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// [`copy_tree`], removing whatever was written to `dst` if the copy fails.
pub fn copy_tree_or_clean(src: &Path, dst: &Path) -> io::Result<u64> {
    copy_tree(src, dst).inspect_err(|err| {
        tracing::warn!(dst = %dst.display(), %err, "copy failed, removing partial tree");
        if let Err(cleanup) = delete_tree(dst) {
            tracing::error!(dst = %dst.display(), err = %cleanup, "failed to remove partial tree");
        }
    })
}

/// Recursively delete `path`. A missing path is not an error.
///
/// Files go before their parent directory so every `remove_dir` sees an
/// empty directory.
pub fn delete_tree(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if !meta.is_dir() {
        return fs::remove_file(path);
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            delete_tree(&entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    fs::remove_dir(path)
}

/// SHA-256 of every file under `root`, keyed by path relative to `root`.
pub fn tree_manifest(root: &Path) -> io::Result<BTreeMap<PathBuf, String>> {
    let mut manifest = BTreeMap::new();
    collect(root, Path::new(""), &mut manifest)?;
    Ok(manifest)
}

fn collect(dir: &Path, rel: &Path, out: &mut BTreeMap<PathBuf, String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let rel_path = rel.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            collect(&entry.path(), &rel_path, out)?;
        } else {
            let data = fs::read(entry.path())?;
            out.insert(rel_path, sha256_hex(&data));
        }
    }
    Ok(())
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
