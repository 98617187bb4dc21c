use crate::joblog::JobLog;
use crate::metadata::{self, KeyRemoval};
use crate::references;
use crate::transcode::{self, TranscodeError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions of files treated as course images.
const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpeg", ".jpg"];

/// Tally of what one course rewrite touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub converted: usize,
    pub removed: usize,
    pub failed: usize,
}

/// How one image left the pipeline.
enum ImageOutcome {
    Converted,
    Removed,
}

/// Any failure that sinks a single image without sinking the course.
#[derive(Debug, Error)]
enum ImageStepError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run the full rewrite over one unpacked course tree.
///
/// Walks the images under `static/`, converts the referenced ones and
/// removes the rest, then applies the unconditional metadata normalization
/// passes. Per-image failures are logged and counted, never fatal; the
/// classification order is whatever the filesystem reports and carries no
/// meaning.
pub fn rewrite_course(course_root: &Path, log: &JobLog) -> RewriteStats {
    let mut stats = RewriteStats::default();
    let registry_path = course_root.join("policies").join("assets.json");

    for image_path in image_files(&course_root.join("static")) {
        log.separator();
        log.info(&format!(
            "Found image file ({}): {}",
            transcode::image_stats(&image_path),
            image_path.display()
        ));

        match process_image(&image_path, course_root, &registry_path, log) {
            Ok(ImageOutcome::Converted) => stats.converted += 1,
            Ok(ImageOutcome::Removed) => stats.removed += 1,
            Err(error) => {
                stats.failed += 1;
                log.error(&format!(
                    "Error optimizing image {}: {error}",
                    image_path.display()
                ));
            }
        }
    }

    normalize_metadata(course_root, &registry_path, log);
    stats
}

/// Snapshot of the image files under `static/`, taken up front so freshly
/// written outputs are not re-yielded by the same pass.
fn image_files(static_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(static_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            !name.starts_with('.') && IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Classify one image and drive it through conversion or removal.
/// Role: per-image body of the rewrite loop.
fn process_image(
    image_path: &Path,
    course_root: &Path,
    registry_path: &Path,
    log: &JobLog,
) -> Result<ImageOutcome, ImageStepError> {
    let on_disk_name = image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let logical_name = references::resolve_logical_name(registry_path, &on_disk_name);
    let referencing_files = references::find_references(&logical_name, course_root, log);

    if referencing_files.is_empty() {
        fs::remove_file(image_path)?;
        log.warning(&format!(
            "Removed unused image file: {}",
            image_path.display()
        ));

        match metadata::delete_key(registry_path, &logical_name) {
            Ok(KeyRemoval::Removed) => log.warning(&format!(
                "Key '{logical_name}' deleted successfully from '{}'.",
                registry_path.display()
            )),
            Ok(KeyRemoval::Absent) => log.warning(&format!(
                "Key '{logical_name}' not found in '{}'.",
                registry_path.display()
            )),
            Err(error) => log.error(&error.to_string()),
        }
        return Ok(ImageOutcome::Removed);
    }

    let was_jpeg = transcode::is_jpeg_name(image_path);
    let output_path = transcode::normalize_to_jpeg(image_path)?;
    log.info(&format!(
        "Optimized and converted to ({}): {}",
        transcode::image_stats(&output_path),
        output_path.display()
    ));
    if !was_jpeg {
        log.info(&format!("Removed original file: {}", image_path.display()));
    }

    // Renames only happen for .png sources; .jpeg keeps its references as
    // they were.
    if logical_name.to_lowercase().ends_with(".png") {
        let stem = &logical_name[..logical_name.len() - 4];
        let new_name = format!("{stem}.jpg");

        for referencing in &referencing_files {
            let content = fs::read_to_string(referencing)?;
            fs::write(referencing, content.replace(&logical_name, &new_name))?;
        }
        log.warning(&format!(
            "Updated references of {logical_name} to {new_name} in course files."
        ));
    }

    Ok(ImageOutcome::Converted)
}

/// The fixed normalization passes over the two metadata documents. These
/// run whether or not any image needed work.
fn normalize_metadata(course_root: &Path, registry_path: &Path, log: &JobLog) {
    value_pass(registry_path, log, "image/png", "image/jpeg");
    value_pass(registry_path, log, "-png.jpg", ".jpg");
    value_pass(registry_path, log, ".png", ".jpg");

    match metadata::rename_keys_containing(registry_path, ".png", ".jpg") {
        Ok(()) => log.info(&format!(
            "Replaced JSON keys in {}: '.png' -> '.jpg'",
            registry_path.display()
        )),
        Err(error) => log.error(&error.to_string()),
    }

    let policies_dir = course_root.join("policies");
    match metadata::locate_document(&policies_dir, "policy.json") {
        Some(policy_path) => value_pass(&policy_path, log, ".png", ".jpg"),
        None => log.error(&format!(
            "No policy.json found under {}",
            policies_dir.display()
        )),
    }
}

fn value_pass(path: &Path, log: &JobLog, needle: &str, replacement: &str) {
    match metadata::substitute_literal(path, needle, replacement) {
        Ok(()) => log.info(&format!(
            "Replaced JSON values in {}: '{needle}' -> '{replacement}'",
            path.display()
        )),
        Err(error) => log.error(&error.to_string()),
    }
}
