//! facegate-core — Face verification building blocks.
//!
//! Detects faces with SCRFD and extracts ArcFace embeddings via ONNX
//! Runtime, matches embeddings by Euclidean distance against a gallery
//! of enrolled faces, and maintains the load-once enrollment cache that
//! backs the verification service.

pub mod detector;
pub mod encoder;
pub mod enrollment;
pub mod recognizer;
pub mod types;

pub use detector::{DetectedFace, FaceDetector};
pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use enrollment::{EnrollmentCache, ScanReport};
pub use recognizer::FaceRecognizer;
pub use types::{Embedding, EnrolledFace, EuclideanMatcher, MatchOutcome, Matcher};

/// Default directory searched for the ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/facegate/models")
}
