use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failure of a whole extraction run. No cards are returned alongside it.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to decode source image")]
    Decode(#[source] image::ImageError),

    #[error("source image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reason a single candidate was dropped. The run carries on without it.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("corners do not define an invertible perspective transform")]
    SingularTransform,

    #[error("warped card has no pixels left after trimming")]
    EmptyResult,

    #[error("failed to encode card")]
    Encode(#[source] image::ImageError),
}

/// Failure of an external barcode or OCR collaborator.
///
/// The identifier resolver treats every one of these as "nothing found".
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },

    #[error("failed to stage card image for {program}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode card image")]
    Image(#[from] image::ImageError),
}
