//! Text recognition contract
//!
//! [`TextRecognizer`] owns the preprocessing policy and the aggregation of
//! word tokens into a single marking string and confidence. The glyph-level
//! engine is injected through [`TextEngine`], so tests and alternative
//! backends can stand in for Tesseract.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use super::preprocess::preprocess_for_ocr;
use super::region::MarkingRegion;
use crate::error::InspectError;

/// Characters IC markings are made of
pub const DEFAULT_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_.+";

/// Layout assumption handed to the text engine
///
/// Values follow Tesseract's page-segmentation mode numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PageSegMode {
    /// Uniform block of text (6)
    #[default]
    Block,
    /// Single text line (7)
    SingleLine,
    /// Single word (8)
    SingleWord,
    /// Sparse text, as much as possible in no order (11)
    SparseText,
    /// Raw line, bypassing engine-specific hacks (13)
    RawLine,
}

impl PageSegMode {
    pub const ALL: [PageSegMode; 5] = [
        PageSegMode::Block,
        PageSegMode::SingleLine,
        PageSegMode::SingleWord,
        PageSegMode::SparseText,
        PageSegMode::RawLine,
    ];

    /// Numeric mode understood by the engine
    pub fn code(self) -> u8 {
        match self {
            PageSegMode::Block => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SingleWord => 8,
            PageSegMode::SparseText => 11,
            PageSegMode::RawLine => 13,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PageSegMode::Block => "Assume a block of text",
            PageSegMode::SingleLine => "Single text line",
            PageSegMode::SingleWord => "Single word",
            PageSegMode::SparseText => "Sparse text",
            PageSegMode::RawLine => "Raw line",
        }
    }
}

/// Page-segmentation code outside the supported set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported page segmentation mode {0} (expected one of 6, 7, 8, 11, 13)")]
pub struct UnsupportedPageSegMode(pub u8);

impl TryFrom<u8> for PageSegMode {
    type Error = UnsupportedPageSegMode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        PageSegMode::ALL
            .into_iter()
            .find(|mode| mode.code() == code)
            .ok_or(UnsupportedPageSegMode(code))
    }
}

impl From<PageSegMode> for u8 {
    fn from(mode: PageSegMode) -> Self {
        mode.code()
    }
}

impl FromStr for PageSegMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a page segmentation mode number", s))?;
        PageSegMode::try_from(code).map_err(|e| e.to_string())
    }
}

impl fmt::Display for PageSegMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// Caller-selected recognition options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Page segmentation mode
    pub psm: PageSegMode,
    /// Adaptive mean thresholding instead of global Otsu
    pub use_adaptive_threshold: bool,
    /// Symbols the engine may emit; empty means the default set
    pub char_whitelist: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            psm: PageSegMode::Block,
            use_adaptive_threshold: true,
            char_whitelist: DEFAULT_WHITELIST.to_string(),
        }
    }
}

impl RecognitionConfig {
    /// Whitelist actually passed to the engine
    pub fn effective_whitelist(&self) -> &str {
        if self.char_whitelist.is_empty() {
            DEFAULT_WHITELIST
        } else {
            &self.char_whitelist
        }
    }
}

/// One word reported by a text engine
#[derive(Debug, Clone, PartialEq)]
pub struct WordToken {
    /// Recognized text, possibly empty
    pub text: String,
    /// Engine confidence in percent (0-100); negative when unavailable
    pub confidence: f32,
}

impl WordToken {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Glyph-level text engine
pub trait TextEngine: Send + Sync {
    /// Recognize words in a binarized image
    fn recognize_words(
        &self,
        image: &GrayImage,
        psm: PageSegMode,
        whitelist: &str,
    ) -> Result<Vec<WordToken>, InspectError>;
}

/// Aggregated marking text
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Space-joined uppercase words
    pub text: String,
    /// Mean word confidence in [0, 1]
    pub confidence: f64,
}

impl Recognition {
    /// Combine engine tokens into the marking text and confidence
    ///
    /// No usable tokens gives empty text with zero confidence.
    pub fn from_tokens(tokens: &[WordToken]) -> Self {
        let text = tokens
            .iter()
            .map(|t| t.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        let confidences: Vec<f64> = tokens
            .iter()
            .map(|t| t.confidence as f64)
            .filter(|c| c.is_finite() && *c >= 0.0)
            .collect();

        let confidence = if confidences.is_empty() {
            0.0
        } else {
            let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
            (mean / 100.0).clamp(0.0, 1.0)
        };

        Self { text, confidence }
    }
}

/// Preprocesses marking regions and reads them with an injected engine
pub struct TextRecognizer {
    engine: Box<dyn TextEngine>,
}

impl TextRecognizer {
    /// Create a recognizer around an engine
    pub fn new(engine: impl TextEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    /// Create a recognizer around an already boxed engine
    pub fn from_boxed(engine: Box<dyn TextEngine>) -> Self {
        Self { engine }
    }

    /// Read the marking text of a region
    pub fn recognize(
        &self,
        region: &MarkingRegion,
        config: &RecognitionConfig,
    ) -> Result<Recognition, InspectError> {
        let start = Instant::now();

        let binary = preprocess_for_ocr(&region.image, config.use_adaptive_threshold);
        let tokens = self
            .engine
            .recognize_words(&binary, config.psm, config.effective_whitelist())?;
        let recognition = Recognition::from_tokens(&tokens);

        debug!(
            "Recognized {:?} (conf {:.3}) from {} tokens, psm {} in {:?}",
            recognition.text,
            recognition.confidence,
            tokens.len(),
            config.psm.code(),
            start.elapsed()
        );

        Ok(recognition)
    }
}

impl fmt::Debug for TextRecognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRecognizer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::BoundingBox;
    use image::{Rgb, RgbImage};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records what it was asked and replies with fixed tokens
    struct ScriptedEngine {
        tokens: Vec<WordToken>,
        calls: Arc<Mutex<Vec<(u32, u32, PageSegMode, String)>>>,
    }

    impl TextEngine for ScriptedEngine {
        fn recognize_words(
            &self,
            image: &GrayImage,
            psm: PageSegMode,
            whitelist: &str,
        ) -> Result<Vec<WordToken>, InspectError> {
            assert!(image.pixels().all(|p| p[0] == 0 || p[0] == 255));
            self.calls
                .lock()
                .push((image.width(), image.height(), psm, whitelist.to_string()));
            Ok(self.tokens.clone())
        }
    }

    fn region() -> MarkingRegion {
        MarkingRegion {
            image: RgbImage::from_pixel(24, 12, Rgb([200, 200, 200])),
            bbox: BoundingBox::new(6, 3, 24, 12),
        }
    }

    #[test]
    fn test_tokens_joined_and_uppercased() {
        let tokens = vec![
            WordToken::new("lm7805", 90.0),
            WordToken::new("", -1.0),
            WordToken::new("  ti ", 80.0),
        ];
        let recognition = Recognition::from_tokens(&tokens);
        assert_eq!(recognition.text, "LM7805 TI");
        assert!((recognition.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_tokens_still_count_confidence() {
        let tokens = vec![WordToken::new("A1", 90.0), WordToken::new(" ", 30.0)];
        let recognition = Recognition::from_tokens(&tokens);
        assert_eq!(recognition.text, "A1");
        assert!((recognition.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_no_tokens() {
        let recognition = Recognition::from_tokens(&[]);
        assert_eq!(recognition.text, "");
        assert_eq!(recognition.confidence, 0.0);
    }

    #[test]
    fn test_only_negative_confidences() {
        let recognition = Recognition::from_tokens(&[WordToken::new("X", -1.0)]);
        assert_eq!(recognition.text, "X");
        assert_eq!(recognition.confidence, 0.0);
    }

    #[test]
    fn test_recognizer_passes_config_to_engine() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recognizer = TextRecognizer::new(ScriptedEngine {
            tokens: vec![WordToken::new("NE555", 70.0)],
            calls: Arc::clone(&calls),
        });

        let config = RecognitionConfig {
            psm: PageSegMode::SingleLine,
            use_adaptive_threshold: false,
            char_whitelist: "NE5".to_string(),
        };
        let recognition = recognizer.recognize(&region(), &config).unwrap();

        assert_eq!(recognition.text, "NE555");
        assert!((recognition.confidence - 0.7).abs() < 1e-9);
        assert_eq!(
            calls.lock().as_slice(),
            &[(24, 12, PageSegMode::SingleLine, "NE5".to_string())]
        );
    }

    #[test]
    fn test_engine_error_is_not_a_recognition() {
        struct BrokenEngine;

        impl TextEngine for BrokenEngine {
            fn recognize_words(
                &self,
                _image: &GrayImage,
                _psm: PageSegMode,
                _whitelist: &str,
            ) -> Result<Vec<WordToken>, InspectError> {
                Err(InspectError::Engine("Failed to read word text".to_string()))
            }
        }

        let recognizer = TextRecognizer::new(BrokenEngine);
        let err = recognizer
            .recognize(&region(), &RecognitionConfig::default())
            .unwrap_err();
        assert!(matches!(err, InspectError::Engine(_)));
    }

    #[test]
    fn test_empty_whitelist_uses_default() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recognizer = TextRecognizer::new(ScriptedEngine {
            tokens: vec![],
            calls: Arc::clone(&calls),
        });

        let config = RecognitionConfig {
            char_whitelist: String::new(),
            ..Default::default()
        };
        let recognition = recognizer.recognize(&region(), &config).unwrap();

        assert_eq!(recognition, Recognition { text: String::new(), confidence: 0.0 });
        assert_eq!(calls.lock()[0].3, DEFAULT_WHITELIST);
    }

    #[test]
    fn test_page_seg_mode_codes() {
        for code in [6u8, 7, 8, 11, 13] {
            let mode = PageSegMode::try_from(code).unwrap();
            assert_eq!(u8::from(mode), code);
        }
        assert_eq!(PageSegMode::try_from(3), Err(UnsupportedPageSegMode(3)));
        assert_eq!(PageSegMode::default().code(), 6);
    }

    #[test]
    fn test_page_seg_mode_from_str() {
        assert_eq!("11".parse::<PageSegMode>(), Ok(PageSegMode::SparseText));
        assert!("3".parse::<PageSegMode>().is_err());
        assert!("block".parse::<PageSegMode>().is_err());
    }

    #[test]
    fn test_recognition_config_serde() {
        let config: RecognitionConfig = serde_json::from_str(r#"{"psm": 8}"#).unwrap();
        assert_eq!(config.psm, PageSegMode::SingleWord);
        assert!(config.use_adaptive_threshold);
        assert_eq!(config.char_whitelist, DEFAULT_WHITELIST);

        assert!(serde_json::from_str::<RecognitionConfig>(r#"{"psm": 4}"#).is_err());
        assert_eq!(
            serde_json::to_value(RecognitionConfig::default()).unwrap()["psm"],
            serde_json::json!(6)
        );
    }
}
