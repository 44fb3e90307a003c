//! Tesseract OCR engine through leptess.

use super::text_recognizer::OcrEngine;
use crate::core::config::RecognizerConfig;
use crate::core::errors::{FormError, FormResult};
use image::DynamicImage;
use leptess::{LepTess, Variable};
use std::path::{Path, PathBuf};

/// Reads each crop as a single uniform block of text.
///
/// A fresh `LepTess` handle is created per call; handles are not shared between
/// threads.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    language: String,
    tessdata: Option<PathBuf>,
    page_seg_mode: u32,
}

impl TesseractEngine {
    pub fn from_config(config: &RecognizerConfig, tessdata: Option<&Path>) -> Self {
        Self {
            language: config.language.clone(),
            tessdata: tessdata.map(Path::to_path_buf),
            page_seg_mode: config.page_seg_mode,
        }
    }

    /// Creates a handle once so that missing language data fails pipeline
    /// construction instead of every crop.
    pub fn check_language_data(&self) -> FormResult<()> {
        self.handle().map(|_| ()).map_err(|err| {
            let traineddata = self
                .tessdata
                .clone()
                .unwrap_or_default()
                .join(format!("{}.traineddata", self.language));
            FormError::model_load_error(
                &traineddata,
                "tesseract could not load the language data",
                Some("install the language pack or point paths.tessdata at its directory"),
                Some(err),
            )
        })
    }

    fn handle(&self) -> FormResult<LepTess> {
        let datapath = self.tessdata.as_deref().and_then(Path::to_str);
        let mut lt = LepTess::new(datapath, &self.language).map_err(|e| FormError::Ocr {
            message: format!(
                "failed to initialize tesseract for language '{}': {e}",
                self.language
            ),
        })?;
        lt.set_variable(Variable::TesseditPagesegMode, &self.page_seg_mode.to_string())
            .map_err(|e| FormError::Ocr {
                message: format!("failed to set page segmentation mode: {e}"),
            })?;
        Ok(lt)
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, crop: &DynamicImage) -> FormResult<String> {
        let mut lt = self.handle()?;

        // leptess decodes the image itself, so hand it an encoded PNG.
        let mut png = std::io::Cursor::new(Vec::new());
        crop.write_to(&mut png, image::ImageFormat::Png)?;
        lt.set_image_from_mem(png.get_ref())
            .map_err(|e| FormError::Ocr {
                message: format!("failed to load crop into tesseract: {e}"),
            })?;

        lt.get_utf8_text().map_err(|e| FormError::Ocr {
            message: format!("failed to read text: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_language_data_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecognizerConfig {
            language: "zzz".to_string(),
            ..RecognizerConfig::default()
        };
        let engine = TesseractEngine::from_config(&config, Some(dir.path()));

        let err = engine.check_language_data().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("zzz.traineddata"));
    }
}
