use crate::archive::{self, ArchiveError};
use crate::config::Config;
use crate::course;
use crate::joblog::JobLog;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A failure that sinks one course job but leaves the batch running.
#[derive(Debug, Error)]
pub enum CourseError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("could not create course log {}: {source}", path.display())]
    Log { path: PathBuf, source: io::Error },
}

/// A failure before or outside the worker pool; these end the run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not prepare directory {}: {source}", path.display())]
    Bootstrap { path: PathBuf, source: io::Error },
    #[error("could not open application log {}: {source}", path.display())]
    Log { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Process every course archive under the configured source directory.
///
/// Archives are handed to a worker pool in waves; a failed job is logged
/// and the wave carries on. All four configured directories are created
/// up front when missing.
pub fn run(config: &Config) -> Result<(), RunError> {
    for dir in [
        &config.source_dir,
        &config.log_dir,
        &config.output_dir,
        &config.work_dir,
    ] {
        fs::create_dir_all(dir).map_err(|source| RunError::Bootstrap {
            path: dir.clone(),
            source,
        })?;
    }

    let log_path = config.log_dir.join("application.log");
    let run_log = JobLog::create(&log_path, true).map_err(|source| RunError::Log {
        path: log_path,
        source,
    })?;

    let archives = discover_archives(&config.source_dir);
    if archives.is_empty() {
        run_log.info("No .tar.gz files found in source directory.");
        return Ok(());
    }

    let workers = config.effective_workers();
    let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;

    for wave in archives.chunks(config.batch_size.min(workers).max(1)) {
        pool.install(|| {
            wave.par_iter().for_each(|archive_path| {
                if let Err(error) = process_archive(archive_path, config, &run_log) {
                    run_log.error(&format!(
                        "Failed to process {}: {error}",
                        archive_path.display()
                    ));
                }
            });
        });
    }

    run_log.info("All courses have been optimized");
    run_log.banner();
    Ok(())
}

/// Take one archive from source to optimized output.
/// Role: the unit of work a pool thread runs.
pub fn process_archive(
    archive_path: &Path,
    config: &Config,
    run_log: &JobLog,
) -> Result<PathBuf, CourseError> {
    let name = archive_stem(archive_path);
    run_log.info(&format!("Processing tar file: {}", archive_path.display()));

    let log_path = config.log_dir.join(format!("{name}.log"));
    let course_log = JobLog::create(&log_path, false).map_err(|source| CourseError::Log {
        path: log_path,
        source,
    })?;

    course_log.banner();
    course_log.info(&format!("Starting new image optimization for {name}"));

    let working_dir = config.work_dir.join(&name);
    archive::unpack(archive_path, &working_dir)?;

    let stats = course::rewrite_course(&working_dir.join("course"), &course_log);
    course_log.separator();
    course_log.info(&format!(
        "Course rewrite done: {} converted, {} removed, {} failed",
        stats.converted, stats.removed, stats.failed
    ));

    let output_path = archive::pack(
        &working_dir,
        &config.output_dir,
        &format!("{name}-optimized"),
    )?;
    course_log.info(&format!(
        "Created TGZ optimized course at {}",
        output_path.display()
    ));

    if let Err(error) = fs::remove_dir_all(&working_dir) {
        course_log.error(&format!(
            "Could not remove working directory {}: {error}",
            working_dir.display()
        ));
    }

    Ok(output_path)
}

/// The course archives under `source_dir`, in name order so waves are
/// formed the same way on every run.
fn discover_archives(source_dir: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/*.tar.gz", source_dir.display());
    let mut archives: Vec<PathBuf> = glob::glob(&pattern)
        .map(|paths| paths.filter_map(Result::ok).collect())
        .unwrap_or_default();
    archives.sort();
    archives
}

/// Course name from an archive path, `.tar.gz` stripped.
fn archive_stem(archive_path: &Path) -> String {
    let name = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".tar.gz").map(str::to_owned).unwrap_or(name)
}
