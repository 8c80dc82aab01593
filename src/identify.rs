use image::RgbaImage;
use log::{debug, warn};

use crate::backend::{BarcodeDecoder, TextRecognizer};

/// Longest identifier kept, extension excluded
pub const MAX_IDENTIFIER_LEN: usize = 64;

const SERIAL_MIN_LEN: usize = 6;
const SERIAL_MAX_LEN: usize = 24;
const FALLBACK_TOKENS: usize = 4;

/// Keep ASCII letters, digits, `_` and `-`, capped at 64 characters
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_IDENTIFIER_LEN)
        .collect()
}

/// Default name for the `index`-th card (1-based)
pub fn positional_identifier(index: usize) -> String {
    format!("card_{}", index)
}

/// Turn raw OCR output into an identifier candidate.
///
/// Prefers the first serial-number shaped run (6 to 24 ASCII alphanumerics,
/// a longer run contributes its first 24); otherwise joins the first four
/// words with underscores. Empty text yields nothing.
pub fn identifier_from_text(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let collapsed = words.join(" ");

    let serial = collapsed
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|run| run.len() >= SERIAL_MIN_LEN)
        .map(|run| run[..run.len().min(SERIAL_MAX_LEN)].to_string());

    Some(serial.unwrap_or_else(|| {
        words
            .iter()
            .take(FALLBACK_TOKENS)
            .copied()
            .collect::<Vec<_>>()
            .join("_")
    }))
}

/// Names extracted cards: barcode, then OCR, then position
pub struct IdentifierResolver<'a> {
    barcode: &'a dyn BarcodeDecoder,
    ocr: &'a dyn TextRecognizer,
    extension: String,
}

impl<'a> IdentifierResolver<'a> {
    pub fn new(
        barcode: &'a dyn BarcodeDecoder,
        ocr: &'a dyn TextRecognizer,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            barcode,
            ocr,
            extension: extension.into(),
        }
    }

    fn from_barcode(&self, card: &RgbaImage) -> Option<String> {
        match self.barcode.decode(card) {
            Ok(found) => found,
            Err(err) => {
                warn!("Barcode decoding failed: {}", err);
                None
            }
        }
    }

    fn from_text(&self, card: &RgbaImage) -> Option<String> {
        match self.ocr.recognize(card) {
            Ok(recognition) => identifier_from_text(&recognition.text),
            Err(err) => {
                warn!("Text recognition failed: {}", err);
                None
            }
        }
    }

    /// Identifier without extension, always matching `[A-Za-z0-9_-]{1,64}`.
    ///
    /// A step whose result sanitizes to nothing counts as a miss. OCR only
    /// runs when the barcode step misses.
    pub fn identifier(&self, card: &RgbaImage, index: usize) -> String {
        let usable = |raw: String| Some(sanitize(&raw)).filter(|s| !s.is_empty());

        if let Some(id) = self.from_barcode(card).and_then(usable) {
            debug!("Card {} identified by barcode: {}", index, id);
            return id;
        }
        if let Some(id) = self.from_text(card).and_then(usable) {
            debug!("Card {} identified by text: {}", index, id);
            return id;
        }

        sanitize(&positional_identifier(index))
    }

    /// File name for the `index`-th card (1-based)
    pub fn file_name(&self, card: &RgbaImage, index: usize) -> String {
        format!("{}.{}", self.identifier(card, index), self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NoDecoder, NoRecognizer, Recognition};
    use crate::error::BackendError;
    use std::cell::Cell;

    struct Barcode(Option<&'static str>);

    impl BarcodeDecoder for Barcode {
        fn decode(&self, _image: &RgbaImage) -> Result<Option<String>, BackendError> {
            Ok(self.0.map(str::to_string))
        }
    }

    struct FailingBarcode;

    impl BarcodeDecoder for FailingBarcode {
        fn decode(&self, _image: &RgbaImage) -> Result<Option<String>, BackendError> {
            Err(BackendError::Spawn {
                program: "zbarimg".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            })
        }
    }

    struct Ocr {
        text: &'static str,
        calls: Cell<usize>,
    }

    impl Ocr {
        fn new(text: &'static str) -> Self {
            Self {
                text,
                calls: Cell::new(0),
            }
        }
    }

    impl TextRecognizer for Ocr {
        fn recognize(&self, _image: &RgbaImage) -> Result<Recognition, BackendError> {
            self.calls.set(self.calls.get() + 1);
            Ok(Recognition {
                text: self.text.to_string(),
                confidence: Some(0.9),
            })
        }
    }

    fn is_valid_identifier(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= MAX_IDENTIFIER_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("ABC-123_x"), "ABC-123_x");
        assert_eq!(sanitize("  SN: 44/7.b "), "SN447b");
        assert_eq!(sanitize("Ünïcødé"), "ncd");
        assert_eq!(sanitize(&"x".repeat(100)).len(), 64);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let long = "ab_-".repeat(40);
        for raw in ["../../etc/passwd", "a b c", "ÄÖÜ-ok", "", long.as_str()] {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once);
        }
    }

    #[test]
    fn test_identifier_from_text_prefers_serial() {
        assert_eq!(
            identifier_from_text("Gold  pass\n No. XK4471920 ok"),
            Some("XK4471920".to_string())
        );
    }

    #[test]
    fn test_identifier_from_text_first_run_wins() {
        // A label word long enough to look like a serial comes first
        assert_eq!(
            identifier_from_text("Serial:\n  QX7781234   exp 09/27"),
            Some("Serial".to_string())
        );
    }

    #[test]
    fn test_identifier_from_text_truncates_long_run() {
        let long = "A".repeat(30);
        assert_eq!(identifier_from_text(&long), Some("A".repeat(24)));
    }

    #[test]
    fn test_identifier_from_text_falls_back_to_words() {
        assert_eq!(
            identifier_from_text("to be or not to be"),
            Some("to_be_or_not".to_string())
        );
        assert_eq!(identifier_from_text("Hi"), Some("Hi".to_string()));
        assert_eq!(identifier_from_text(" \n\t "), None);
    }

    #[test]
    fn test_barcode_wins_and_skips_ocr() {
        let ocr = Ocr::new("SERIAL998877");
        let barcode = Barcode(Some("ABC123"));
        let resolver = IdentifierResolver::new(&barcode, &ocr, "png");

        assert_eq!(resolver.file_name(&RgbaImage::new(4, 4), 1), "ABC123.png");
        assert_eq!(ocr.calls.get(), 0);
    }

    #[test]
    fn test_ocr_used_when_barcode_fails() {
        let ocr = Ocr::new("ID 20240518AB");
        let resolver = IdentifierResolver::new(&FailingBarcode, &ocr, "png");

        assert_eq!(resolver.file_name(&RgbaImage::new(4, 4), 2), "20240518AB.png");
        assert_eq!(ocr.calls.get(), 1);
    }

    #[test]
    fn test_unusable_barcode_falls_through() {
        let barcode = Barcode(Some("§§§"));
        let resolver = IdentifierResolver::new(&barcode, &NoRecognizer, "png");
        assert_eq!(resolver.file_name(&RgbaImage::new(4, 4), 3), "card_3.png");
    }

    #[test]
    fn test_positional_default() {
        let resolver = IdentifierResolver::new(&NoDecoder, &NoRecognizer, "png");
        let img = RgbaImage::new(4, 4);
        let names: Vec<String> = (1..=3).map(|i| resolver.identifier(&img, i)).collect();
        assert_eq!(names, vec!["card_1", "card_2", "card_3"]);
        assert!(names.iter().all(|n| is_valid_identifier(n)));
    }

    #[test]
    fn test_barcode_payload_is_sanitized() {
        let barcode = Barcode(Some("https://example.com/item?id=42"));
        let resolver = IdentifierResolver::new(&barcode, &NoRecognizer, "png");
        let id = resolver.identifier(&RgbaImage::new(4, 4), 1);
        assert_eq!(id, "httpsexamplecomitemid42");
        assert!(is_valid_identifier(&id));
    }
}
