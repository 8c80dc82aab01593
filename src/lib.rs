pub mod backend;
pub mod cli;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod identify;
pub mod pipeline;
pub mod transform;

pub use backend::{
    BarcodeDecoder, CommandDecoder, DecoderChain, NoDecoder, NoRecognizer, Recognition,
    TesseractRecognizer, TextRecognizer,
};
pub use cli::Cli;
pub use detection::{detect_candidates, filter_candidates, Polygon, Quadrilateral};
pub use error::{BackendError, CandidateError, ExtractError};
pub use geometry::{edge_length, order_corners, target_size, OrderedCorners};
pub use identify::{sanitize, IdentifierResolver};
pub use pipeline::{CardExtractor, OutputRecord, PipelineConfig, Progress};
pub use transform::{extract_card, ExtractedCard};
