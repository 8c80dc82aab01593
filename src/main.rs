use std::collections::HashSet;
use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use card_split::{
    BarcodeDecoder, CardExtractor, Cli, CommandDecoder, DecoderChain, NoDecoder, NoRecognizer,
    TesseractRecognizer, TextRecognizer,
};

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Reserve `name` in `taken`, appending -2, -3, ... to the stem on collision
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (name, String::new()),
    };

    let mut n = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let barcode: Box<dyn BarcodeDecoder> = if cli.no_barcode {
        Box::new(NoDecoder)
    } else {
        Box::new(
            DecoderChain::new()
                .with(CommandDecoder {
                    program: cli.zbar.clone(),
                    ..CommandDecoder::zbar()
                })
                .with(CommandDecoder {
                    program: cli.dmtx.clone(),
                    ..CommandDecoder::dmtx()
                }),
        )
    };

    let ocr: Box<dyn TextRecognizer> = if cli.no_ocr {
        Box::new(NoRecognizer)
    } else {
        Box::new(TesseractRecognizer::new(&cli.tesseract, &cli.ocr_lang))
    };

    let extractor = CardExtractor::new(cli.pipeline_config(), barcode.as_ref(), ocr.as_ref());
    let config = extractor.config();
    info!(
        "Canny {}/{}, minimum card area {:.1}% of image",
        config.canny_low,
        config.canny_high,
        config.min_area_fraction * 100.0
    );

    let records = extractor
        .extract_cards_from_path(&cli.input, |p| {
            info!(
                "Processed {}/{} candidates ({:.0}%)",
                p.completed,
                p.total,
                p.fraction() * 100.0
            );
        })
        .with_context(|| format!("Failed to extract cards from {:?}", cli.input))?;

    if records.is_empty() {
        eprintln!("No cards found in {:?}", cli.input);
        return Ok(());
    }

    let output_dir = cli.output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let mut taken = HashSet::new();
    for record in &records {
        let name = unique_name(&record.identifier, &mut taken);
        let path = output_dir.join(&name);
        fs::write(&path, &record.bytes)
            .with_context(|| format!("Failed to save output: {:?}", path))?;
        eprintln!("Saved {:?} ({}x{})", path, record.width, record.height);
    }

    eprintln!("Extracted {} cards into {:?}", records.len(), output_dir);

    Ok(())
}
