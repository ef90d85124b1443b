//! Inspection pipeline
//!
//! Wires the stages together with typed hand-offs:
//! image bytes → [`DynamicImage`] → [`MarkingRegion`](crate::vision::MarkingRegion)
//! → [`Recognition`](crate::vision::Recognition) → [`InspectionResult`].
//!
//! An [`Inspector`] holds no per-inspection state and can be shared across
//! threads.

use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::{decide, InspectionResult};
use crate::error::InspectError;
use crate::kb::{KnowledgeBase, KnowledgeBaseRecord};
use crate::vision::{CenterCropExtractor, RecognitionConfig, RegionExtractor, TextRecognizer};

/// Decode image bytes into a pixel buffer
///
/// Fails with [`InspectError::InvalidImage`] for empty, undecodable, or
/// zero-area input.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, InspectError> {
    if bytes.is_empty() {
        return Err(InspectError::InvalidImage("empty image buffer".to_string()));
    }
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(InspectError::InvalidImage(format!(
            "decoded image has zero area ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(image)
}

/// Runs region extraction, recognition and decision for one image at a time
pub struct Inspector {
    kb: Arc<dyn KnowledgeBase>,
    extractor: Box<dyn RegionExtractor>,
    recognizer: TextRecognizer,
}

impl Inspector {
    /// Create an inspector with the default center-crop extractor
    pub fn new(kb: Arc<dyn KnowledgeBase>, recognizer: TextRecognizer) -> Self {
        Self {
            kb,
            extractor: Box::new(CenterCropExtractor::default()),
            recognizer,
        }
    }

    /// Replace the region extractor
    pub fn with_extractor(mut self, extractor: impl RegionExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// The knowledge base used for lookups
    pub fn knowledge_base(&self) -> &dyn KnowledgeBase {
        self.kb.as_ref()
    }

    /// Inspect encoded image bytes against the record for `part_id`
    pub fn inspect(
        &self,
        image_bytes: &[u8],
        part_id: &str,
        config: &RecognitionConfig,
    ) -> Result<InspectionResult, InspectError> {
        let image = decode_image(image_bytes)?;
        self.inspect_image(&image, part_id, config)
    }

    /// Inspect an already decoded image
    pub fn inspect_image(
        &self,
        image: &DynamicImage,
        part_id: &str,
        config: &RecognitionConfig,
    ) -> Result<InspectionResult, InspectError> {
        let start = Instant::now();

        let Some(record) = self.lookup(part_id) else {
            info!("Part '{}' not in knowledge base", part_id);
            return Ok(InspectionResult::unknown_part());
        };

        let region = self.extractor.extract(image)?;
        let recognition = self.recognizer.recognize(&region, config)?;
        let result = decide(&recognition.text, Some(&record), recognition.confidence)
            .with_bbox(region.bbox);

        info!(
            "Inspected '{}': {} (final_conf {:.3}) [{}]",
            part_id,
            result.verdict,
            result.final_conf(),
            result.reasons_joined()
        );
        debug!("Inspection of '{}' took {:?}", part_id, start.elapsed());

        Ok(result)
    }

    /// Record lookup; unreadable records are treated as unknown parts
    fn lookup(&self, part_id: &str) -> Option<Arc<KnowledgeBaseRecord>> {
        match self.kb.load(part_id) {
            Ok(record) => record,
            Err(e) => {
                warn!("Treating '{}' as unknown: {}", part_id, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("recognizer", &self.recognizer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::{ReasonCode, Verdict};
    use crate::kb::KbStore;
    use crate::vision::{BoundingBox, PageSegMode, TextEngine, WordToken};
    use image::{GrayImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Engine that always reads the same words and counts its calls
    pub(crate) struct FixedEngine {
        pub tokens: Vec<WordToken>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FixedEngine {
        pub(crate) fn reading(words: &[(&str, f32)]) -> Self {
            Self {
                tokens: words.iter().map(|(t, c)| WordToken::new(*t, *c)).collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl TextEngine for FixedEngine {
        fn recognize_words(
            &self,
            _image: &GrayImage,
            _psm: PageSegMode,
            _whitelist: &str,
        ) -> Result<Vec<WordToken>, InspectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tokens.clone())
        }
    }

    struct FailingEngine;

    impl TextEngine for FailingEngine {
        fn recognize_words(
            &self,
            _image: &GrayImage,
            _psm: PageSegMode,
            _whitelist: &str,
        ) -> Result<Vec<WordToken>, InspectError> {
            Err(InspectError::Engine("engine offline".to_string()))
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([180, 180, 180]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub(crate) fn kb_with_lm7805() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("LM7805.yaml"),
            "oem: TI\npart_number: LM7805CT\npatterns:\n  part_code: \"^LM7805\"\nlogo_hint: TI\n",
        )
        .unwrap();
        dir
    }

    fn inspector(dir: &TempDir, engine: impl TextEngine + 'static) -> Inspector {
        Inspector::new(Arc::new(KbStore::new(dir.path())), TextRecognizer::new(engine))
    }

    #[test]
    fn test_genuine_marking() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FixedEngine::reading(&[("LM7805TI", 100.0), ("DATE2024", 100.0)]));

        let result = inspector
            .inspect(&png_bytes(100, 50), "LM7805", &RecognitionConfig::default())
            .unwrap();

        assert_eq!(result.verdict, Verdict::Genuine);
        assert!(result.reason_codes.is_empty());
        assert_eq!(result.bbox, Some(BoundingBox::new(20, 10, 60, 30)));
        assert_eq!(result.extracted.text.as_deref(), Some("LM7805TI DATE2024"));
        assert_eq!(result.scores.ocr_conf, Some(1.0));
    }

    #[test]
    fn test_missing_logo_is_suspect() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FixedEngine::reading(&[("LM7805", 90.0), ("XX", 90.0)]));

        let result = inspector
            .inspect(&png_bytes(64, 64), "LM7805", &RecognitionConfig::default())
            .unwrap();

        assert_eq!(result.verdict, Verdict::Suspect);
        assert_eq!(result.reason_codes, vec![ReasonCode::LogoFail]);
    }

    #[test]
    fn test_no_text_is_reject() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FixedEngine::reading(&[]));

        let result = inspector
            .inspect(&png_bytes(64, 64), "LM7805", &RecognitionConfig::default())
            .unwrap();

        assert_eq!(result.verdict, Verdict::Reject);
        assert_eq!(result.extracted.text.as_deref(), Some(""));
        assert_eq!(result.scores.ocr_conf, Some(0.0));
    }

    #[test]
    fn test_unknown_part_skips_recognition() {
        let dir = kb_with_lm7805();
        let engine = FixedEngine::reading(&[("LM7805TI", 100.0)]);
        let calls = Arc::clone(&engine.calls);
        let inspector = inspector(&dir, engine);

        let result = inspector
            .inspect(&png_bytes(64, 64), "NE555", &RecognitionConfig::default())
            .unwrap();

        assert_eq!(result, InspectionResult::unknown_part());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_record_treated_as_unknown() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("BAD.yaml"), "patterns: [oops\n").unwrap();
        let inspector = inspector(&dir, FixedEngine::reading(&[("X", 90.0)]));

        let result = inspector
            .inspect(&png_bytes(64, 64), "BAD", &RecognitionConfig::default())
            .unwrap();
        assert_eq!(result.reason_codes, vec![ReasonCode::KbPartUnknown]);
    }

    #[test]
    fn test_undecodable_bytes_are_invalid_image() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FixedEngine::reading(&[]));

        for bytes in [&b""[..], &b"definitely not an image"[..], &[0x89, b'P', b'N', b'G'][..]] {
            for part in ["LM7805", "NE555"] {
                let err = inspector
                    .inspect(bytes, part, &RecognitionConfig::default())
                    .unwrap_err();
                assert!(matches!(err, InspectError::InvalidImage(_)), "{:?}", err);
            }
        }
    }

    #[test]
    fn test_tiny_image_is_invalid() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FixedEngine::reading(&[]));
        let err = inspector
            .inspect(&png_bytes(1, 1), "LM7805", &RecognitionConfig::default())
            .unwrap_err();
        assert!(matches!(err, InspectError::InvalidImage(_)));
    }

    #[test]
    fn test_engine_failure_propagates() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FailingEngine);
        let err = inspector
            .inspect(&png_bytes(64, 64), "LM7805", &RecognitionConfig::default())
            .unwrap_err();
        assert!(matches!(err, InspectError::Engine(_)));
    }

    #[test]
    fn test_custom_extractor() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FixedEngine::reading(&[("LM7805TI", 100.0)]))
            .with_extractor(CenterCropExtractor::new(0.0));

        let result = inspector
            .inspect(&png_bytes(40, 30), "LM7805", &RecognitionConfig::default())
            .unwrap();
        assert_eq!(result.bbox, Some(BoundingBox::new(0, 0, 40, 30)));
    }

    #[test]
    fn test_inspections_are_independent() {
        let dir = kb_with_lm7805();
        let inspector = inspector(&dir, FixedEngine::reading(&[("LM7805TI", 95.0)]));
        let bytes = png_bytes(64, 64);

        let first = inspector.inspect(&bytes, "LM7805", &RecognitionConfig::default()).unwrap();
        let _ = inspector.inspect(&bytes, "NE555", &RecognitionConfig::default()).unwrap();
        let second = inspector.inspect(&bytes, "LM7805", &RecognitionConfig::default()).unwrap();
        assert_eq!(first, second);
    }
}
