//! Segment planning and `filter_complex` graph construction.
//!
//! [`plan_segments`] draws random time ranges from a media duration and
//! [`FilterGraphBuilder`] turns them into a trim -> concat graph for ffmpeg.
//!
//! ```
//! use filtergraph::{FilterGraphBuilder, GraphMode, Segment};
//!
//! let segments = [Segment::new(0.0, 1.0), Segment::new(2.0, 2.5)];
//! let graph = FilterGraphBuilder::new()
//!     .build(&segments, GraphMode::Reverse)
//!     .unwrap();
//! assert!(graph.render().contains("concat=n=2:v=1:a=0[outv]"));
//! ```

pub mod error;
pub mod graph;
pub mod segment;

pub use error::{GraphError, Result};
pub use graph::{
    AUDIO_OUTPUT, ConcatNode, FilterGraph, FilterGraphBuilder, GraphMode, Track, TrimNode,
    VIDEO_OUTPUT,
};
pub use segment::{Segment, SpanRequest, plan_segments};
