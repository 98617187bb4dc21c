//! # Course image optimizer
//!
//! Batch pipeline over packaged course exports. Each `.tar.gz` archive is
//! unpacked into a working directory, every raster image under the course's
//! `static/` directory is rewritten as a compact progressive JPEG (or
//! deleted when nothing references it), content references and metadata
//! documents are kept in step with the renames, and the result is packaged
//! back up as `<name>-optimized.tar.gz`.
//!
//! [`runner::run`] drives the whole batch; the modules underneath split the
//! work the way the pipeline does:
//!
//! - [`archive`]: tarball extraction and repackaging
//! - [`transcode`]: the image rewrite itself
//! - [`references`]: who uses which image, and under what name
//! - [`metadata`]: surgical edits to the JSON course documents
//! - [`course`]: the per-course rewrite loop
//! - [`joblog`]: per-job log files

pub mod archive;
pub mod config;
pub mod course;
pub mod joblog;
pub mod metadata;
pub mod references;
pub mod runner;
pub mod transcode;

pub use config::Config;
pub use joblog::JobLog;
