//! Packs what the user pointed at into a single uploadable file.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use tracing::{debug, info, warn};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Suffixes uploaded without re-compressing.
pub const COMPRESSED_EXTENSIONS: &[&str] = &[
    ".zip", ".rar", ".7z", ".gz", ".tar.gz", ".tgz", ".bz2", ".xz", ".tar",
];

/// The file to upload, plus ownership of it when it is a temporary archive.
#[derive(Debug)]
pub struct PreparedUpload {
    path: PathBuf,
    temporary: bool,
}

impl PreparedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Base name used for the remote file.
    pub fn file_name(&self) -> anyhow::Result<&str> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no usable file name", self.path.display()))
    }

    /// Removes the temporary archive, if any. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if !self.temporary {
            return;
        }
        self.temporary = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "temporary archive removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "cannot remove temporary archive"),
        }
    }
}

impl Drop for PreparedUpload {
    fn drop(&mut self) {
        self.cleanup();
    }
}

pub fn is_compressed(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    COMPRESSED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Returns `path` as-is when it is already an archive (or any regular file
/// with `compress_dir_only`); otherwise zips it into the temp directory.
pub fn prepare_upload(path: &Path, compress_dir_only: bool) -> anyhow::Result<PreparedUpload> {
    prepare_upload_in(path, compress_dir_only, &std::env::temp_dir())
}

fn prepare_upload_in(
    path: &Path,
    compress_dir_only: bool,
    tmp_dir: &Path,
) -> anyhow::Result<PreparedUpload> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("invalid source path: {}", path.display()))?;

    if !meta.is_dir() && (compress_dir_only || is_compressed(path)) {
        debug!(path = %path.display(), "uploading source as-is");
        return Ok(PreparedUpload {
            path: path.to_path_buf(),
            temporary: false,
        });
    }
    if !meta.is_dir() && !meta.is_file() {
        bail!("{} is neither a file nor a directory", path.display());
    }

    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let zip_path = tmp_dir.join(format!("{base}-{millis}.zip"));

    // Owns the file from here on, so a failed write is cleaned up too.
    let prepared = PreparedUpload {
        path: zip_path,
        temporary: true,
    };
    if prepared.path.exists() {
        std::fs::remove_file(&prepared.path)
            .with_context(|| format!("removing stale {}", prepared.path.display()))?;
    }

    info!(source = %path.display(), "compressing");
    write_zip(path, base, &prepared.path)
        .with_context(|| format!("compressing {}", path.display()))?;
    Ok(prepared)
}

fn write_zip(source: &Path, base: &str, dest: &Path) -> anyhow::Result<()> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    if source.is_dir() {
        add_dir(&mut zip, source, base, options)?;
    } else {
        add_file(&mut zip, source, base, options)?;
    }

    zip.finish()?;
    Ok(())
}

fn add_dir<W: io::Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> anyhow::Result<()> {
    zip.add_directory(format!("{name}/"), options)?;

    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let child_name = format!("{name}/{}", entry.file_name().to_string_lossy());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            add_dir(zip, &entry.path(), &child_name, options)?;
        } else if entry.path().is_file() {
            add_file(zip, &entry.path(), &child_name, options)?;
        } else {
            debug!(path = %entry.path().display(), "skipping special file");
        }
    }
    Ok(())
}

fn add_file<W: io::Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> anyhow::Result<()> {
    zip.start_file(name, options)?;
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    io::copy(&mut file, zip)?;
    Ok(())
}
