use crate::config::Config;
use facegate_core::{
    EncoderError, EnrollmentCache, EuclideanMatcher, FaceEncoder, Matcher, OnnxFaceEncoder,
};
use image::imageops::FilterType;
use image::DynamicImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Upload dimension bound. Larger images are downscaled before
/// detection, which caps inference cost and evens out detection
/// accuracy across upload sizes.
const MAX_WIDTH: u32 = 640;
const MAX_HEIGHT: u32 = 480;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Verdict for one uploaded image.
#[derive(Debug)]
pub enum Verdict {
    /// The upload decoded but contained no detectable face.
    NoFace,
    /// Nothing is enrolled, so there is nothing to compare against.
    NoEnrolledFaces,
    /// The probe was compared against the full gallery.
    Compared {
        granted: bool,
        min_distance: f32,
        threshold: f32,
    },
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Verify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Verdict, EngineError>>,
    },
    Preload {
        reply: oneshot::Sender<usize>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request verification of one uploaded image.
    pub async fn verify(&self, image: Vec<u8>) -> Result<Verdict, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Populate the enrollment cache now instead of on the first
    /// request. Returns the number of enrolled faces.
    pub async fn preload(&self) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Preload { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine with the ONNX encoder on a dedicated OS thread.
///
/// Loads both models synchronously and fails fast when either is
/// missing. Inference and the enrollment scan are CPU-bound, so they
/// live on this thread rather than the HTTP event loop; the request
/// channel also serializes the populate-once path of the cache.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EncoderError> {
    let encoder = OnnxFaceEncoder::load(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
    )?;
    tracing::info!(model_dir = %config.model_dir.display(), "face models loaded");

    let cache = EnrollmentCache::new(&config.faces_dir);
    Ok(spawn_with(Box::new(encoder), cache, config.threshold))
}

/// Spawn the engine thread around any [`FaceEncoder`].
pub fn spawn_with(
    mut encoder: Box<dyn FaceEncoder + Send>,
    mut cache: EnrollmentCache,
    threshold: f32,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify { image, reply } => {
                        let result =
                            run_verify(&image, encoder.as_mut(), &mut cache, threshold);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Preload { reply } => {
                        let enrolled = cache.ensure_loaded(encoder.as_mut()).len();
                        let _ = reply.send(enrolled);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

/// Decode, bound, encode, compare. Runs on the engine thread.
fn run_verify(
    bytes: &[u8],
    encoder: &mut dyn FaceEncoder,
    cache: &mut EnrollmentCache,
    threshold: f32,
) -> Result<Verdict, EngineError> {
    let decoded = image::load_from_memory(bytes)?;
    let rgb = bound_dimensions(decoded).to_rgb8();

    let probes = encoder.detect_and_encode(&rgb)?;
    let Some(probe) = probes.first() else {
        tracing::debug!("no face detected in upload");
        return Ok(Verdict::NoFace);
    };
    if probes.len() > 1 {
        // Multi-face uploads are not rejected; the first face wins.
        tracing::debug!(faces = probes.len(), "multiple faces in upload, using the first");
    }

    let gallery = cache.ensure_loaded(encoder);
    if gallery.is_empty() {
        tracing::debug!("no authorized faces enrolled");
        return Ok(Verdict::NoEnrolledFaces);
    }

    let outcome = EuclideanMatcher.compare(probe, gallery, threshold);
    tracing::info!(
        granted = outcome.granted,
        min_distance = outcome.min_distance,
        closest = outcome.source.as_deref().unwrap_or("-"),
        "comparison complete"
    );

    Ok(Verdict::Compared {
        granted: outcome.granted,
        min_distance: outcome.min_distance,
        threshold,
    })
}

/// Downscale so neither dimension exceeds 640×480, preserving aspect
/// ratio with Lanczos resampling. Smaller images pass through.
fn bound_dimensions(image: DynamicImage) -> DynamicImage {
    if image.width() <= MAX_WIDTH && image.height() <= MAX_HEIGHT {
        return image;
    }
    image.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::Embedding;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(32, 32, Rgb(color));
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Encoder stub deriving a normalized 3-dim embedding from the
    /// top-left pixel, so colors act as identities.
    fn pixel_encoder() -> Box<dyn FaceEncoder + Send> {
        Box::new(|image: &RgbImage| -> Result<Vec<Embedding>, EncoderError> {
            let p = image.get_pixel(0, 0);
            Ok(vec![Embedding {
                values: vec![
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                ],
                model_version: None,
            }])
        })
    }

    fn enroll_dir(colors: &[(&str, [u8; 3])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, color) in colors {
            RgbImage::from_pixel(16, 16, Rgb(*color))
                .save(dir.path().join(name))
                .unwrap();
        }
        dir
    }

    #[test]
    fn test_bound_dimensions_downscales_large() {
        let big = DynamicImage::new_rgb8(1280, 960);
        let bounded = bound_dimensions(big);
        assert!(bounded.width() <= MAX_WIDTH);
        assert!(bounded.height() <= MAX_HEIGHT);
    }

    #[test]
    fn test_bound_dimensions_preserves_aspect() {
        let wide = DynamicImage::new_rgb8(2000, 400);
        let bounded = bound_dimensions(wide);
        assert_eq!(bounded.width(), 640);
        assert_eq!(bounded.height(), 128);
    }

    #[test]
    fn test_bound_dimensions_never_upscales() {
        let small = DynamicImage::new_rgb8(100, 80);
        let bounded = bound_dimensions(small);
        assert_eq!((bounded.width(), bounded.height()), (100, 80));
    }

    #[tokio::test]
    async fn test_verify_grants_matching_face() {
        let dir = enroll_dir(&[("alice.png", [255, 0, 0])]);
        let engine = spawn_with(pixel_encoder(), EnrollmentCache::new(dir.path()), 0.65);

        let verdict = engine.verify(png_bytes([255, 0, 0])).await.unwrap();
        match verdict {
            Verdict::Compared { granted, min_distance, threshold } => {
                assert!(granted);
                assert!(min_distance < 1e-6);
                assert!((threshold - 0.65).abs() < 1e-6);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_denies_distant_face() {
        let dir = enroll_dir(&[("alice.png", [255, 0, 0])]);
        let engine = spawn_with(pixel_encoder(), EnrollmentCache::new(dir.path()), 0.65);

        // Green is sqrt(2) away from red in the stub embedding space.
        let verdict = engine.verify(png_bytes([0, 255, 0])).await.unwrap();
        match verdict {
            Verdict::Compared { granted, min_distance, .. } => {
                assert!(!granted);
                assert!((min_distance - 2.0f32.sqrt()).abs() < 1e-4);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_reports_minimum_distance() {
        let dir = enroll_dir(&[
            ("red.png", [255, 0, 0]),
            ("halfway.png", [128, 0, 0]),
            ("black.png", [0, 0, 0]),
        ]);
        let engine = spawn_with(pixel_encoder(), EnrollmentCache::new(dir.path()), 0.65);

        let verdict = engine.verify(png_bytes([255, 0, 0])).await.unwrap();
        match verdict {
            Verdict::Compared { min_distance, .. } => assert!(min_distance < 1e-6),
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_no_face_detected() {
        let dir = enroll_dir(&[("alice.png", [255, 0, 0])]);
        let blind: Box<dyn FaceEncoder + Send> =
            Box::new(|_: &RgbImage| -> Result<Vec<Embedding>, EncoderError> { Ok(Vec::new()) });
        let engine = spawn_with(blind, EnrollmentCache::new(dir.path()), 0.65);

        let verdict = engine.verify(png_bytes([255, 0, 0])).await.unwrap();
        assert!(matches!(verdict, Verdict::NoFace));
    }

    #[tokio::test]
    async fn test_verify_empty_enrollment() {
        let dir = TempDir::new().unwrap();
        let engine = spawn_with(pixel_encoder(), EnrollmentCache::new(dir.path()), 0.65);

        let verdict = engine.verify(png_bytes([255, 0, 0])).await.unwrap();
        assert!(matches!(verdict, Verdict::NoEnrolledFaces));
    }

    #[tokio::test]
    async fn test_verify_corrupt_bytes_is_an_error() {
        let dir = TempDir::new().unwrap();
        let engine = spawn_with(pixel_encoder(), EnrollmentCache::new(dir.path()), 0.65);

        let err = engine.verify(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[tokio::test]
    async fn test_preload_counts_enrolled_faces() {
        let dir = enroll_dir(&[("a.png", [1, 2, 3]), ("b.jpg", [4, 5, 6])]);
        let engine = spawn_with(pixel_encoder(), EnrollmentCache::new(dir.path()), 0.65);
        assert_eq!(engine.preload().await.unwrap(), 2);
    }
}
