//! Tesseract text engine
//!
//! Uses Tesseract through leptess. Each call creates its own Tesseract
//! handle, so a single engine can serve concurrent inspections.

use image::{GrayImage, ImageFormat};
use leptess::{LepTess, Variable};
use std::io::Cursor;
use tracing::{debug, info};

use super::recognizer::{PageSegMode, TextEngine, WordToken};
use crate::error::InspectError;

/// Text engine backed by Tesseract
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    /// Tesseract language code (e.g. "eng")
    language: String,
    /// Directory holding traineddata files; `None` uses the system default
    datapath: Option<String>,
}

impl TesseractEngine {
    /// Create an engine, checking that Tesseract initializes for `language`
    pub fn new(language: &str, datapath: Option<&str>) -> Result<Self, InspectError> {
        let engine = Self {
            language: language.to_string(),
            datapath: datapath.map(str::to_string),
        };
        engine.init()?;
        info!("Tesseract engine ready (language '{}')", language);
        Ok(engine)
    }

    fn init(&self) -> Result<LepTess, InspectError> {
        LepTess::new(self.datapath.as_deref(), &self.language).map_err(|e| {
            InspectError::Engine(format!(
                "Failed to initialize Tesseract with language '{}': {}. \
                 Make sure the traineddata for this language is installed",
                self.language, e
            ))
        })
    }
}

impl TextEngine for TesseractEngine {
    fn recognize_words(
        &self,
        image: &GrayImage,
        psm: PageSegMode,
        whitelist: &str,
    ) -> Result<Vec<WordToken>, InspectError> {
        let mut lt = self.init()?;

        lt.set_variable(Variable::TesseditPagesegMode, &psm.code().to_string())
            .map_err(|e| InspectError::Engine(format!("Failed to set PSM: {}", e)))?;
        lt.set_variable(Variable::TesseditCharWhitelist, whitelist)
            .map_err(|e| InspectError::Engine(format!("Failed to set whitelist: {}", e)))?;

        // leptess takes encoded image data
        let mut png_buf = Cursor::new(Vec::new());
        image
            .write_to(&mut png_buf, ImageFormat::Png)
            .map_err(|e| InspectError::Engine(format!("Failed to encode image to PNG: {}", e)))?;
        lt.set_image_from_mem(png_buf.get_ref())
            .map_err(|e| InspectError::Engine(format!("Failed to set image from memory: {}", e)))?;

        // No boxes means no text, which is a valid outcome
        let Some(boxes) = lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_WORD, true)
        else {
            debug!("Tesseract found no words");
            return Ok(Vec::new());
        };

        let mut tokens = Vec::new();
        for bbox in &boxes {
            let geom = bbox.get_geometry();
            lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

            let text = lt
                .get_utf8_text()
                .map_err(|e| InspectError::Engine(format!("Failed to read word text: {}", e)))?;
            let confidence = lt.mean_text_conf() as f32;
            tokens.push(WordToken::new(text.trim(), confidence));
        }

        debug!("Tesseract returned {} word boxes", tokens.len());
        Ok(tokens)
    }
}
