//! External barcode and OCR collaborators.
//!
//! The resolver only sees the two traits. The concrete implementations shell
//! out to command line tools (`zbarimg`, `dmtxread`, `tesseract`) with the
//! card staged as a temporary PNG.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use image::{ImageFormat, RgbaImage};
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::error::BackendError;

/// Reads a linear or 2D code off a card image
pub trait BarcodeDecoder {
    /// `Ok(None)` when no symbol was found
    fn decode(&self, image: &RgbaImage) -> Result<Option<String>, BackendError>;
}

/// Text recognised on a card
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Engine-reported confidence, when the engine reports one
    pub confidence: Option<f32>,
}

/// Runs OCR over a card image
pub trait TextRecognizer {
    fn recognize(&self, image: &RgbaImage) -> Result<Recognition, BackendError>;
}

/// Decoder that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecoder;

impl BarcodeDecoder for NoDecoder {
    fn decode(&self, _image: &RgbaImage) -> Result<Option<String>, BackendError> {
        Ok(None)
    }
}

/// Recognizer that never reads any text
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecognizer;

impl TextRecognizer for NoRecognizer {
    fn recognize(&self, _image: &RgbaImage) -> Result<Recognition, BackendError> {
        Ok(Recognition::default())
    }
}

/// Write the card to a temporary PNG that lives as long as the handle
fn stage_png(image: &RgbaImage, program: &str) -> Result<NamedTempFile, BackendError> {
    let io_err = |source| BackendError::Io {
        program: program.to_string(),
        source,
    };

    let mut file = tempfile::Builder::new()
        .prefix("card-split-")
        .suffix(".png")
        .tempfile()
        .map_err(io_err)?;
    image.write_to(&mut file, ImageFormat::Png)?;
    file.flush().map_err(io_err)?;

    Ok(file)
}

fn run(
    program: &str,
    args: &[String],
    path: &Path,
    trailing: &[String],
) -> Result<Output, BackendError> {
    Command::new(program)
        .args(args)
        .arg(path)
        .args(trailing)
        .output()
        .map_err(|source| BackendError::Spawn {
            program: program.to_string(),
            source,
        })
}

/// Barcode decoder backed by an external program that prints decoded
/// payloads on stdout, one per line.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandDecoder {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// ZBar: CODE128, CODE39, CODE93, EAN/UPC, ITF, Codabar, QR, PDF417
    pub fn zbar() -> Self {
        Self::new("zbarimg", &["--quiet", "--raw"])
    }

    /// libdmtx: DataMatrix
    pub fn dmtx() -> Self {
        Self::new("dmtxread", &["-N1"])
    }
}

impl BarcodeDecoder for CommandDecoder {
    fn decode(&self, image: &RgbaImage) -> Result<Option<String>, BackendError> {
        let staged = stage_png(image, &self.program)?;
        let output = run(&self.program, &self.args, staged.path(), &[])?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string);

        // Decoders commonly exit non-zero when no symbol is present
        if payload.is_none() && !output.status.success() {
            debug!("{} found nothing ({})", self.program, output.status);
        }

        Ok(payload)
    }
}

/// Tries several decoders in turn; the first payload wins
#[derive(Default)]
pub struct DecoderChain {
    decoders: Vec<Box<dyn BarcodeDecoder>>,
}

impl DecoderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, decoder: impl BarcodeDecoder + 'static) -> Self {
        self.decoders.push(Box::new(decoder));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl BarcodeDecoder for DecoderChain {
    fn decode(&self, image: &RgbaImage) -> Result<Option<String>, BackendError> {
        for decoder in &self.decoders {
            match decoder.decode(image) {
                Ok(Some(text)) => return Ok(Some(text)),
                Ok(None) => {}
                Err(err) => warn!("Barcode decoder unavailable: {}", err),
            }
        }
        Ok(None)
    }
}

/// OCR through the `tesseract` command line tool
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    pub program: String,
    pub language: String,
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &RgbaImage) -> Result<Recognition, BackendError> {
        let staged = stage_png(image, &self.program)?;
        let trailing = ["stdout".to_string(), "-l".to_string(), self.language.clone()];
        let output = run(&self.program, &[], staged.path(), &trailing)?;

        if !output.status.success() {
            return Err(BackendError::Failed {
                program: self.program.clone(),
                status: output.status,
            });
        }

        Ok(Recognition {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            confidence: None,
        })
    }
}
