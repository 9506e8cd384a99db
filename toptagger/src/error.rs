//! Error types for constituent packaging, tagger configuration and resolution.

use thiserror::Error;

use crate::physics::top_object::TopId;

#[derive(Error, Debug)]
pub enum TaggerError {
    #[error("Unequal vector size for {what}: expected {expected}, got {found}")]
    LengthMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("Extra variable {name}[{index}] is not found")]
    MissingExtraVariable { name: String, index: usize },

    #[error("Index {index} into {what} is out of range (length {len})")]
    IndexOutOfRange { what: String, index: usize, len: usize },

    #[error("Fat jet {jet} has {count} subjets, at most 2 are allowed")]
    TooManySubjets { jet: usize, count: usize },

    #[error("Missing required parameter \"{key}\" in context \"{context}\"")]
    MissingParameter { key: String, context: String },

    #[error("Invalid parameter \"{key}\" in context \"{context}\": {reason}")]
    InvalidParameter {
        key: String,
        context: String,
        reason: String,
    },

    #[error("Invalid configuration document: {0}")]
    InvalidDocument(String),

    #[error("Feature \"{feature}\" is not provided by the {calculator} calculator")]
    UnknownFeature { feature: String, calculator: String },

    #[error("Unknown tagger module \"{0}\"")]
    UnknownModule(String),

    #[error("Discriminant model \"{0}\" is not loaded")]
    ModelNotFound(String),

    #[error("Calibration curve \"{0}\" is not available")]
    CurveNotFound(String),

    #[error("Calibration file not found: {0}")]
    CalibrationFileNotFound(String),

    #[error("Discriminator of candidate {0} was already set")]
    DiscriminatorAlreadySet(TopId),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TaggerResult<T> = Result<T, TaggerError>;

/// Fails with [`TaggerError::LengthMismatch`] unless both lengths agree.
pub fn check_length(what: &str, expected: usize, found: usize) -> TaggerResult<()> {
    if expected != found {
        return Err(TaggerError::LengthMismatch {
            what: what.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}
