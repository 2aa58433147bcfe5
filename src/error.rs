use crate::global_variables::Float;
use std::path::PathBuf;
use thiserror::Error;

pub type SolverResult<T> = Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("mesh format error in {file}, line {line}: {message}")]
    MeshFormat {
        file: String,
        line: usize,
        message: String,
    },

    #[error("degenerate cell ({j}, {i}) in block {block}: volume = {volume:e}")]
    DegenerateCell {
        block: usize,
        j: usize,
        i: usize,
        volume: Float,
    },

    #[error(
        "numerical breakdown in block {block}, cell ({j}, {i}) at iteration {iteration}, time {time:e}: {quantity} = {value:e}"
    )]
    NumericalBreakdown {
        block: usize,
        j: usize,
        i: usize,
        iteration: usize,
        time: Float,
        quantity: &'static str,
        value: Float,
    },

    #[error("joint {joint}: range lengths differ ({left} faces against {right} faces)")]
    JointRangeMismatch {
        joint: usize,
        left: usize,
        right: usize,
    },

    #[error("joint {joint}: {message}")]
    JointIndex { joint: usize, message: String },

    #[error(
        "boundary range [{start:?}, {end:?}) is outside edge {edge} of block {block} ({faces} faces)"
    )]
    BoundaryRange {
        block: usize,
        edge: usize,
        start: Option<usize>,
        end: Option<usize>,
        faces: usize,
    },

    #[error("invalid value for `{key}`: {message}")]
    Config { key: String, message: String },

    #[error("snapshot error in {path:?}: {message}")]
    Snapshot { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SolverError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        SolverError::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}
