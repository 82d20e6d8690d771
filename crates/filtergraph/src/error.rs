use thiserror::Error;

/// Errors raised while planning segments or assembling a filter graph.
///
/// All of these are precondition failures: they are detected before the
/// engine is ever invoked.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("segment plan is empty")]
    EmptyPlan,

    #[error("invalid span bounds: min {min_span}s, max {max_span}s")]
    InvalidBounds { min_span: f64, max_span: f64 },

    #[error("media is {duration:.2}s long, shorter than the minimum span of {min_span:.2}s")]
    DurationTooShort { duration: f64, min_span: f64 },

    #[error("segment {index} is out of order: {start}s..{end}s")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    #[error("stutter mode needs a repeat segment and at least one scramble segment, got {0}")]
    StutterTooShort(usize),

    #[error("duplicate node label [{0}]")]
    DuplicateLabel(String),

    #[error("node [{0}] is never consumed")]
    UnconsumedNode(String),

    #[error("node [{0}] is consumed more than once")]
    ReusedNode(String),

    #[error("concat references unknown node [{0}]")]
    UnknownInput(String),

    #[error("video and audio concat differ: {video} video inputs, {audio} audio inputs")]
    TrackMismatch { video: usize, audio: usize },
}

pub type Result<T> = std::result::Result<T, GraphError>;
