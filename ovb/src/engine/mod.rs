//! The external media engine seam.
//!
//! The engine is a black box: it gets an input path, a descriptor and an
//! output path, and reports success or a captured error. [`FfmpegEngine`]
//! is the production implementation.

mod ffmpeg;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use filtergraph::FilterGraph;

pub use ffmpeg::{FfmpegConfig, FfmpegEngine, parse_probe};
pub(crate) use ffmpeg::process_failure;

use crate::Result;

/// What the engine should do with the input.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// Plain output options, e.g. `-vf reverse -af areverse`.
    Filters(Vec<String>),
    /// A constructed multi-segment graph.
    Graph(FilterGraph),
}

/// A single engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Options placed before `-i`, such as `-stream_loop -1`.
    pub input_args: Vec<String>,
    pub descriptor: Descriptor,
}

impl EngineInvocation {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, descriptor: Descriptor) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            input_args: Vec::new(),
            descriptor,
        }
    }

    pub fn with_input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Output options, after `-i` and before the output path.
    pub fn output_args(&self) -> Vec<String> {
        match &self.descriptor {
            Descriptor::Filters(args) => args.clone(),
            Descriptor::Graph(graph) => graph.to_args(),
        }
    }

    /// The full argument list for an ffmpeg-compatible binary.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.output_args());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Stream facts needed to plan compound effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaProbe {
    /// Seconds.
    pub duration: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineRun {
    pub elapsed: Duration,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one invocation to completion.
    ///
    /// A spawn failure, non-zero exit or timeout is an `Error::Engine`
    /// carrying the tail of stderr.
    async fn run(&self, invocation: &EngineInvocation) -> Result<EngineRun>;

    async fn probe(&self, path: &Path) -> Result<MediaProbe>;
}
