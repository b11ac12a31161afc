use std::time::Duration;

use thiserror::Error;

use crate::constants::DetectionId;

#[derive(Error, Debug)]
pub enum DaylinkError {
    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Badly-formatted detection record: {0}")]
    DetectionParseError(String),

    #[error("Badly-formatted id-set record: {0}")]
    IdSetParseError(String),

    #[error("Unknown or unimplemented output method: {0}")]
    UnknownOutputMethod(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Detection not found in catalog: {0}")]
    DetectionNotFound(DetectionId),

    #[error("Degenerate quadratic fit: {0}")]
    DegenerateFit(String),

    #[error("Linking worker {rank} did not report completion within {timeout:?}")]
    WorkerStalled { rank: usize, timeout: Duration },

    #[error("Worker {0} panicked during search")]
    WorkerPanicked(usize),
}

impl PartialEq for DaylinkError {
    fn eq(&self, other: &Self) -> bool {
        use DaylinkError::*;
        match (self, other) {
            // IO errors are not comparable: equality on variant only
            (IoError(_), IoError(_)) => true,

            (DetectionParseError(a), DetectionParseError(b)) => a == b,
            (IdSetParseError(a), IdSetParseError(b)) => a == b,
            (UnknownOutputMethod(a), UnknownOutputMethod(b)) => a == b,
            (InvalidConfiguration(a), InvalidConfiguration(b)) => a == b,
            (DetectionNotFound(a), DetectionNotFound(b)) => a == b,
            (DegenerateFit(a), DegenerateFit(b)) => a == b,
            (
                WorkerStalled { rank: a, timeout: ta },
                WorkerStalled { rank: b, timeout: tb },
            ) => a == b && ta == tb,
            (WorkerPanicked(a), WorkerPanicked(b)) => a == b,

            _ => false,
        }
    }
}
