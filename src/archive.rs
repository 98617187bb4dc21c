use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to extract {}: {source}", archive.display())]
    Extraction {
        archive: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to package {}: {source}", archive.display())]
    Packaging {
        archive: PathBuf,
        source: std::io::Error,
    },
}

/// Extract a `.tar.gz` archive into `working_dir`.
///
/// The working directory is created if missing and cleared of any previous
/// contents first. Entries that would land outside it are refused by the
/// extractor.
pub fn unpack(archive_path: &Path, working_dir: &Path) -> Result<(), ArchiveError> {
    let extraction = |source: std::io::Error| ArchiveError::Extraction {
        archive: archive_path.to_path_buf(),
        source,
    };

    fs::create_dir_all(working_dir).map_err(extraction)?;
    clear_dir(working_dir).map_err(extraction)?;

    let file = File::open(archive_path).map_err(extraction)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.unpack(working_dir).map_err(extraction)?;
    Ok(())
}

/// Package `working_dir` as `output_dir/<name>.tar.gz`, rooted under a
/// single top-level entry named after the working directory itself.
pub fn pack(working_dir: &Path, output_dir: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let archive_path = output_dir.join(format!("{name}.tar.gz"));
    let packaging = |source: std::io::Error| ArchiveError::Packaging {
        archive: archive_path.clone(),
        source,
    };

    let file = File::create(&archive_path).map_err(packaging)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let base = working_dir.file_name().unwrap_or(working_dir.as_os_str());
    builder.append_dir_all(base, working_dir).map_err(packaging)?;

    let encoder = builder.into_inner().map_err(packaging)?;
    encoder.finish().map_err(packaging)?;
    Ok(archive_path)
}

/// Remove every entry under `dir`, keeping the directory itself.
fn clear_dir(dir: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
