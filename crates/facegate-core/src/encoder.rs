//! The face-encoding capability boundary.
//!
//! Everything above the model layer depends only on [`FaceEncoder`]:
//! one operation turning an RGB image into zero or more embeddings,
//! ordered by detection confidence. Any conforming implementation can
//! be substituted for the ONNX-backed one.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("encoder error: {0}")]
    Other(String),
}

/// Capability interface over face detection + embedding extraction.
///
/// Returns one embedding per detected face, sorted by detection
/// confidence; an image without faces yields an empty vector, which is
/// a normal outcome rather than an error.
pub trait FaceEncoder {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncoderError>;
}

/// Closures are encoders. Used by tests to stub out the model layer.
impl<F> FaceEncoder for F
where
    F: FnMut(&RgbImage) -> Result<Vec<Embedding>, EncoderError>,
{
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncoderError> {
        self(image)
    }
}

/// SCRFD + ArcFace encoder running on ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models, failing fast when either file is missing.
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, EncoderError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            recognizer: FaceRecognizer::load(recognizer_path)?,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_and_encode(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncoderError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(faces = faces.len(), "detection complete");

        let mut embeddings = Vec::with_capacity(faces.len());
        for face in &faces {
            embeddings.push(self.recognizer.extract(image, face)?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_closure_is_an_encoder() {
        let mut encoder = |_: &RgbImage| -> Result<Vec<Embedding>, EncoderError> {
            Ok(vec![Embedding { values: vec![1.0, 0.0], model_version: None }])
        };
        let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let out = encoder.detect_and_encode(&image).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_closure_encoder_propagates_errors() {
        let mut encoder = |_: &RgbImage| -> Result<Vec<Embedding>, EncoderError> {
            Err(EncoderError::Other("model exploded".into()))
        };
        let image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        assert!(encoder.detect_and_encode(&image).is_err());
    }
}
