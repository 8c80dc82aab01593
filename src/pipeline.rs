use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbaImage};
use log::{debug, info, warn};

use crate::backend::{BarcodeDecoder, TextRecognizer};
use crate::detection::{detect_candidates, Quadrilateral};
use crate::error::{CandidateError, ExtractError};
use crate::identify::IdentifierResolver;
use crate::transform::{extract_card, ExtractedCard};

/// Tunables for the detection and extraction pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Gaussian sigma applied before edge detection (1.1 ~ a 5x5 kernel)
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Closing radius; the structuring element is a (2r+1) square
    pub close_radius: u8,
    /// Douglas-Peucker tolerance as a fraction of contour perimeter
    pub approx_epsilon_fraction: f64,
    /// Candidates must cover strictly more than this fraction of the image
    pub min_area_fraction: f64,
    /// Pixels cut from each side of a warped card
    pub border_trim: u32,
    /// Output file extension, without the dot
    pub extension: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
            close_radius: 2,
            approx_epsilon_fraction: 0.02,
            min_area_fraction: 0.01,
            border_trim: 1,
            extension: "png".to_string(),
        }
    }
}

/// One named, encoded card
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// File name, extension included
    pub identifier: String,
    /// PNG-encoded card
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Candidates processed so far, reported after each one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

fn encode_png(card: &ExtractedCard) -> Result<Vec<u8>, CandidateError> {
    let mut bytes = Vec::new();
    card.image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(CandidateError::Encode)?;
    Ok(bytes)
}

/// Finds, deskews and names every card in a photo
pub struct CardExtractor<'a> {
    config: PipelineConfig,
    resolver: IdentifierResolver<'a>,
}

impl<'a> CardExtractor<'a> {
    pub fn new(
        config: PipelineConfig,
        barcode: &'a dyn BarcodeDecoder,
        ocr: &'a dyn TextRecognizer,
    ) -> Self {
        let resolver = IdentifierResolver::new(barcode, ocr, config.extension.clone());
        Self { config, resolver }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read a photo from disk and extract its cards
    pub fn extract_cards_from_path(
        &self,
        path: impl AsRef<Path>,
        progress: impl FnMut(Progress),
    ) -> Result<Vec<OutputRecord>, ExtractError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.extract_cards_from_bytes(&bytes, progress)
    }

    /// Decode a PNG/JPEG photo and extract its cards
    pub fn extract_cards_from_bytes(
        &self,
        bytes: &[u8],
        progress: impl FnMut(Progress),
    ) -> Result<Vec<OutputRecord>, ExtractError> {
        let img = image::load_from_memory(bytes).map_err(ExtractError::Decode)?;
        self.extract_cards(&img, progress)
    }

    /// Extract every card found in `source`.
    ///
    /// Detection failures abort the run. A candidate that cannot be extracted
    /// is dropped and the remaining ones still come back. Position-based
    /// names count only candidates that survived extraction.
    pub fn extract_cards(
        &self,
        source: &DynamicImage,
        progress: impl FnMut(Progress),
    ) -> Result<Vec<OutputRecord>, ExtractError> {
        let candidates = detect_candidates(source, &self.config)?;
        info!("Found {} card candidates", candidates.len());

        let rgba: RgbaImage = source.to_rgba8();
        let records = self.extract_candidates(&rgba, &candidates, progress);

        info!("Extracted {} of {} candidates", records.len(), candidates.len());
        Ok(records)
    }

    fn extract_candidates(
        &self,
        source: &RgbaImage,
        candidates: &[Quadrilateral],
        mut progress: impl FnMut(Progress),
    ) -> Vec<OutputRecord> {
        let total = candidates.len();
        let mut records = Vec::with_capacity(total);

        for (i, quad) in candidates.iter().enumerate() {
            match self.process_candidate(source, quad, records.len() + 1) {
                Ok(record) => {
                    debug!(
                        "Candidate {} -> {} ({}x{})",
                        i + 1,
                        record.identifier,
                        record.width,
                        record.height
                    );
                    records.push(record);
                }
                Err(err) => warn!("Dropping candidate {}: {}", i + 1, err),
            }

            progress(Progress {
                completed: i + 1,
                total,
            });
        }

        records
    }

    fn process_candidate(
        &self,
        source: &RgbaImage,
        quad: &Quadrilateral,
        index: usize,
    ) -> Result<OutputRecord, CandidateError> {
        let card = extract_card(source, quad, self.config.border_trim)?;
        let bytes = encode_png(&card)?;
        let identifier = self.resolver.file_name(&card.image, index);

        Ok(OutputRecord {
            identifier,
            bytes,
            width: card.width(),
            height: card.height(),
        })
    }
}
