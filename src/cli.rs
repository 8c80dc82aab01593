use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "card-split")]
#[command(version, about = "Split a scanned photo of several cards into one deskewed image per card")]
pub struct Cli {
    /// Input PNG or JPEG image path
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output directory [default: <input>_cards]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Show detection details
    #[arg(long)]
    pub verbose: bool,

    /// Lower Canny hysteresis threshold
    #[arg(long, default_value = "50")]
    pub canny_low: f32,

    /// Upper Canny hysteresis threshold
    #[arg(long, default_value = "150")]
    pub canny_high: f32,

    /// Smallest card area as a fraction of the image (e.g. 0.01)
    #[arg(long, default_value = "0.01", value_parser = parse_fraction)]
    pub min_area: f64,

    /// Skip barcode decoding
    #[arg(long)]
    pub no_barcode: bool,

    /// Skip text recognition
    #[arg(long)]
    pub no_ocr: bool,

    /// Tesseract language(s), e.g. "eng+deu"
    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    /// ZBar executable
    #[arg(long, default_value = "zbarimg")]
    pub zbar: String,

    /// libdmtx executable
    #[arg(long, default_value = "dmtxread")]
    pub dmtx: String,

    /// Tesseract executable
    #[arg(long, default_value = "tesseract")]
    pub tesseract: String,
}

impl Cli {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            let stem = self.input.file_stem().unwrap_or_default().to_string_lossy();
            let parent = self.input.parent().unwrap_or(std::path::Path::new("."));
            parent.join(format!("{}_cards", stem))
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            canny_low: self.canny_low,
            canny_high: self.canny_high,
            min_area_fraction: self.min_area,
            ..PipelineConfig::default()
        }
    }
}

fn parse_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("Invalid fraction: {}", s))?;

    if !(0.0..1.0).contains(&value) {
        return Err("Fraction must be in [0, 1)".to_string());
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fraction() {
        assert_eq!(parse_fraction("0.05"), Ok(0.05));
        assert!(parse_fraction("1.5").is_err());
        assert!(parse_fraction("-0.1").is_err());
        assert!(parse_fraction("lots").is_err());
    }

    #[test]
    fn test_default_output_dir() {
        let cli = Cli::parse_from(["card-split", "scans/batch7.jpg"]);
        assert_eq!(cli.output_dir(), PathBuf::from("scans/batch7_cards"));
        assert_eq!(cli.pipeline_config().min_area_fraction, 0.01);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "card-split",
            "in.png",
            "-o",
            "out",
            "--min-area",
            "0.2",
            "--canny-low",
            "30",
            "--no-ocr",
        ]);
        assert_eq!(cli.output_dir(), PathBuf::from("out"));
        let config = cli.pipeline_config();
        assert_eq!(config.min_area_fraction, 0.2);
        assert_eq!(config.canny_low, 30.0);
        assert!(cli.no_ocr);
        assert!(!cli.no_barcode);
    }
}
