//! Load-once cache of authorized face embeddings.
//!
//! Scans a directory of reference images exactly once, keeps the first
//! embedding per qualifying image keyed by filename, and serves the
//! retained entries for the lifetime of the process. A changed backing
//! directory is not observed until [`EnrollmentCache::reload`] or a
//! process restart — staleness is the documented policy, not an
//! accident.

use crate::encoder::{EncoderError, FaceEncoder};
use crate::types::{Embedding, EnrolledFace};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Outcome of one directory scan, surfaced for observability and tests.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Number of reference images that produced an enrolled embedding.
    pub enrolled: usize,
    /// Filenames skipped because they failed to decode, failed to
    /// encode, or contained no detectable face.
    pub skipped: Vec<String>,
}

/// Why a single reference image was skipped. Never aborts the scan.
#[derive(Error, Debug)]
enum SkipReason {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Encode(#[from] EncoderError),
    #[error("no face detected")]
    NoFace,
}

/// The set of authorized face embeddings, populated at most once.
///
/// Lifecycle is {empty → populated}: the first [`ensure_loaded`]
/// performs the directory scan, every later call returns the retained
/// entries without touching the filesystem.
///
/// [`ensure_loaded`]: EnrollmentCache::ensure_loaded
pub struct EnrollmentCache {
    dir: PathBuf,
    entries: Option<Vec<EnrolledFace>>,
    report: Option<ScanReport>,
}

impl EnrollmentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: None,
            report: None,
        }
    }

    /// Return the enrolled faces, scanning the directory on first use.
    ///
    /// Idempotent: once populated this performs no I/O. A single bad
    /// reference image never fails the load; it degrades to fewer
    /// enrolled faces. An unreadable directory yields an empty cache.
    pub fn ensure_loaded(&mut self, encoder: &mut dyn FaceEncoder) -> &[EnrolledFace] {
        if self.entries.is_none() {
            self.reload(encoder);
        }
        self.entries.as_deref().unwrap_or(&[])
    }

    /// Re-scan the backing directory, replacing all retained entries.
    ///
    /// The only refresh mechanism besides a process restart.
    pub fn reload(&mut self, encoder: &mut dyn FaceEncoder) -> &ScanReport {
        let (entries, report) = scan(&self.dir, encoder);
        tracing::info!(
            dir = %self.dir.display(),
            enrolled = report.enrolled,
            skipped = report.skipped.len(),
            "enrollment scan complete"
        );
        self.entries = Some(entries);
        self.report.insert(report)
    }

    /// Report from the most recent scan, if any scan has happened.
    pub fn report(&self) -> Option<&ScanReport> {
        self.report.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.entries.is_some()
    }
}

/// Scan a directory of reference images into enrolled faces.
///
/// Only regular files with a png/jpg/jpeg extension (case-insensitive)
/// qualify; the first detected face's embedding wins per file. Entries
/// come back sorted by filename so gallery order is deterministic.
fn scan(dir: &Path, encoder: &mut dyn FaceEncoder) -> (Vec<EnrolledFace>, ScanReport) {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) => {
            tracing::warn!(
                dir = %dir.display(),
                error = %err,
                "reference image directory unreadable, enrolling nothing"
            );
            return (Vec::new(), ScanReport { enrolled: 0, skipped: Vec::new() });
        }
    };

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        if !path.is_file() || !has_image_extension(&path) {
            continue;
        }
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match enroll_one(&path, encoder) {
            Ok(embedding) => {
                tracing::debug!(file = %source, "reference face enrolled");
                entries.push(EnrolledFace { source, embedding });
            }
            Err(reason) => {
                tracing::warn!(file = %source, reason = %reason, "skipping reference image");
                skipped.push(source);
            }
        }
    }

    let report = ScanReport { enrolled: entries.len(), skipped };
    (entries, report)
}

/// Decode one reference image and extract its first face embedding.
fn enroll_one(path: &Path, encoder: &mut dyn FaceEncoder) -> Result<Embedding, SkipReason> {
    let image = image::open(path)?.to_rgb8();
    let mut embeddings = encoder.detect_and_encode(&image)?;
    if embeddings.is_empty() {
        return Err(SkipReason::NoFace);
    }
    Ok(embeddings.swap_remove(0))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
