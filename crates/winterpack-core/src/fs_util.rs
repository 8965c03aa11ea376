use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Writes `data` to a temp file beside `path` and renames it into place, so
/// readers only ever see the old or the new contents.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(data).context("write temp file")?;
    tmp.as_file().sync_all().context("sync temp file")?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase bare hex for a digest given as `<hex>` or `sha256:<hex>`.
pub fn normalize_sha256(expected: &str) -> String {
    let trimmed = expected.trim();
    let hex = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => &trimmed[7..],
        _ => trimmed,
    };
    hex.to_ascii_lowercase()
}

pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(sha256_file(a)? == sha256_file(b)?)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExistingFile {
    /// Replace whatever is at the destination.
    Overwrite,
    /// Leave the destination alone; differing content is reported.
    Keep,
}

#[derive(Debug, Default)]
pub struct CopyReport {
    pub copied: usize,
    pub identical: usize,
    pub conflicts: Vec<PathBuf>,
}

impl CopyReport {
    fn absorb(&mut self, other: CopyReport) {
        self.copied += other.copied;
        self.identical += other.identical;
        self.conflicts.extend(other.conflicts);
    }
}

/// Copies a file or a directory tree from `src` to `dst`. Symlinks are
/// followed; the copy holds real files only.
pub fn copy_tree(src: &Path, dst: &Path, existing: ExistingFile) -> anyhow::Result<CopyReport> {
    let mut report = CopyReport::default();
    if src.is_file() {
        report.absorb(copy_one(src, dst, existing)?);
        return Ok(report);
    }
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .context("entry outside copy root")?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("create directory {}", target.display()))?;
            continue;
        }
        report.absorb(copy_one(entry.path(), &target, existing)?);
    }
    Ok(report)
}

fn copy_one(src: &Path, dst: &Path, existing: ExistingFile) -> anyhow::Result<CopyReport> {
    let mut report = CopyReport::default();
    if dst.exists() && existing == ExistingFile::Keep {
        if files_identical(src, dst)
            .with_context(|| format!("compare {} with {}", src.display(), dst.display()))?
        {
            report.identical += 1;
        } else {
            report.conflicts.push(dst.to_path_buf());
        }
        return Ok(report);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("copy {} to {}", src.display(), dst.display()))?;
    report.copied += 1;
    Ok(report)
}

/// Checks that every file under `src` has a byte-identical counterpart at the
/// same relative location under `dst`. Returns the first mismatch.
pub fn find_mismatch(src: &Path, dst: &Path) -> anyhow::Result<Option<PathBuf>> {
    if src.is_file() {
        let matches = dst.is_file() && files_identical(src, dst)?;
        return Ok((!matches).then(|| dst.to_path_buf()));
    }
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .context("entry outside verify root")?;
        let target = dst.join(relative);
        let matches = if entry.file_type().is_dir() {
            target.is_dir()
        } else {
            target.is_file() && files_identical(entry.path(), &target)?
        };
        if !matches {
            return Ok(Some(target));
        }
    }
    Ok(None)
}
