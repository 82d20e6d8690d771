//! `filter_complex` construction for multi-segment effects.
//!
//! The graph is strictly linear: every segment becomes one trim node per
//! track, and each track ends in a single concat node. Video and audio
//! concat inputs are kept in the same segment order so picture and sound
//! stay paired.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::segment::Segment;

pub const VIDEO_OUTPUT: &str = "outv";
pub const AUDIO_OUTPUT: &str = "outa";

/// How segments are arranged in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    /// Segments are kept as-is, in planning order.
    Forward,
    /// Every segment is played backwards.
    Reverse,
    /// The first segment is a "repeat" clip, followed by short "scramble" clips.
    Stutter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    Video,
    Audio,
}

impl Track {
    fn source_pad(&self) -> &'static str {
        match self {
            Track::Video => "0:v",
            Track::Audio => "0:a",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Track::Video => "v",
            Track::Audio => "a",
        }
    }
}

/// Trim (and optionally reverse) one segment of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimNode {
    pub label: String,
    pub track: Track,
    pub segment: Segment,
    pub reversed: bool,
}

impl TrimNode {
    fn render(&self, out: &mut String) {
        let (trim, setpts, reverse) = match self.track {
            Track::Video => ("trim", "setpts", "reverse"),
            Track::Audio => ("atrim", "asetpts", "areverse"),
        };
        let _ = write!(
            out,
            "[{}]{}=start={:.3}:end={:.3},{}=PTS-STARTPTS",
            self.track.source_pad(),
            trim,
            self.segment.start,
            self.segment.end,
            setpts
        );
        if self.reversed {
            out.push(',');
            out.push_str(reverse);
        }
        let _ = write!(out, "[{}]", self.label);
    }
}

/// Concatenate the labelled outputs of one track into a final pad.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatNode {
    pub track: Track,
    pub inputs: Vec<String>,
    pub output: String,
}

impl ConcatNode {
    fn render(&self, out: &mut String) {
        for input in &self.inputs {
            let _ = write!(out, "[{}]", input);
        }
        let (v, a) = match self.track {
            Track::Video => (1, 0),
            Track::Audio => (0, 1),
        };
        let _ = write!(
            out,
            "concat=n={}:v={}:a={}[{}]",
            self.inputs.len(),
            v,
            a,
            self.output
        );
    }
}

/// Builds a [`FilterGraph`] from planned segments.
#[derive(Debug, Clone, Copy)]
pub struct FilterGraphBuilder {
    with_audio: bool,
}

impl Default for FilterGraphBuilder {
    fn default() -> Self {
        Self { with_audio: true }
    }
}

impl FilterGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether to emit audio trim nodes and an audio concat.
    pub fn with_audio(mut self, with_audio: bool) -> Self {
        self.with_audio = with_audio;
        self
    }

    pub fn build(&self, segments: &[Segment], mode: GraphMode) -> Result<FilterGraph> {
        if segments.is_empty() {
            return Err(GraphError::EmptyPlan);
        }
        if mode == GraphMode::Stutter && segments.len() < 2 {
            return Err(GraphError::StutterTooShort(segments.len()));
        }
        for (index, seg) in segments.iter().enumerate() {
            if !(seg.start >= 0.0 && seg.start < seg.end) {
                return Err(GraphError::InvalidSegment {
                    index,
                    start: seg.start,
                    end: seg.end,
                });
            }
        }

        let tracks: &[Track] = if self.with_audio {
            &[Track::Video, Track::Audio]
        } else {
            &[Track::Video]
        };

        let mut trims = Vec::with_capacity(segments.len() * tracks.len());
        let mut concats = Vec::with_capacity(tracks.len());

        for &track in tracks {
            let mut inputs = Vec::with_capacity(segments.len());
            for (index, seg) in segments.iter().enumerate() {
                let label = node_label(track, mode, index);
                trims.push(TrimNode {
                    label: label.clone(),
                    track,
                    segment: *seg,
                    reversed: mode == GraphMode::Reverse,
                });
                inputs.push(label);
            }
            let output = match track {
                Track::Video => VIDEO_OUTPUT,
                Track::Audio => AUDIO_OUTPUT,
            };
            concats.push(ConcatNode {
                track,
                inputs,
                output: output.to_string(),
            });
        }

        let graph = FilterGraph { trims, concats };
        graph.validate()?;

        debug!(
            ?mode,
            segments = segments.len(),
            with_audio = self.with_audio,
            "Built filter graph"
        );
        Ok(graph)
    }
}

fn node_label(track: Track, mode: GraphMode, index: usize) -> String {
    let prefix = track.prefix();
    match mode {
        GraphMode::Stutter if index == 0 => format!("{prefix}repeat"),
        GraphMode::Stutter => format!("{prefix}scramble{index}"),
        _ => format!("{prefix}{index}"),
    }
}

/// A validated trim -> concat graph ready to hand to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    trims: Vec<TrimNode>,
    concats: Vec<ConcatNode>,
}

impl FilterGraph {
    pub fn trims(&self) -> &[TrimNode] {
        &self.trims
    }

    pub fn concats(&self) -> &[ConcatNode] {
        &self.concats
    }

    pub fn trim_count(&self, track: Track) -> usize {
        self.trims.iter().filter(|t| t.track == track).count()
    }

    pub fn has_audio(&self) -> bool {
        self.concats.iter().any(|c| c.track == Track::Audio)
    }

    /// Check label uniqueness and that every trim feeds exactly one concat.
    pub fn validate(&self) -> Result<()> {
        let mut declared = HashSet::new();
        for trim in &self.trims {
            if !declared.insert(trim.label.as_str()) {
                return Err(GraphError::DuplicateLabel(trim.label.clone()));
            }
        }
        for concat in &self.concats {
            if !declared.insert(concat.output.as_str()) {
                return Err(GraphError::DuplicateLabel(concat.output.clone()));
            }
        }

        let mut consumed: HashMap<&str, usize> = HashMap::new();
        for concat in &self.concats {
            for input in &concat.inputs {
                let known = self
                    .trims
                    .iter()
                    .any(|t| t.label == *input && t.track == concat.track);
                if !known {
                    return Err(GraphError::UnknownInput(input.clone()));
                }
                *consumed.entry(input.as_str()).or_default() += 1;
            }
        }
        for trim in &self.trims {
            match consumed.get(trim.label.as_str()) {
                None => return Err(GraphError::UnconsumedNode(trim.label.clone())),
                Some(&n) if n > 1 => return Err(GraphError::ReusedNode(trim.label.clone())),
                Some(_) => {}
            }
        }

        let inputs_of = |track: Track| {
            self.concats
                .iter()
                .filter(|c| c.track == track)
                .map(|c| c.inputs.len())
                .sum::<usize>()
        };
        let (video, audio) = (inputs_of(Track::Video), inputs_of(Track::Audio));
        if self.has_audio() && video != audio {
            return Err(GraphError::TrackMismatch { video, audio });
        }
        Ok(())
    }

    /// Render as a single `filter_complex` string.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.trims.len() + self.concats.len());
        for trim in &self.trims {
            let mut part = String::new();
            trim.render(&mut part);
            parts.push(part);
        }
        for concat in &self.concats {
            let mut part = String::new();
            concat.render(&mut part);
            parts.push(part);
        }
        parts.join(";")
    }

    /// Engine arguments: the graph plus `-map` for each final pad.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-filter_complex".to_string(), self.render()];
        for concat in &self.concats {
            args.push("-map".to_string());
            args.push(format!("[{}]", concat.output));
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::plan_segments;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn segs() -> Vec<Segment> {
        vec![
            Segment::new(1.0, 2.5),
            Segment::new(0.25, 1.0),
            Segment::new(4.0, 5.0),
        ]
    }

    #[test]
    fn test_empty_plan_rejected() {
        let err = FilterGraphBuilder::new()
            .build(&[], GraphMode::Reverse)
            .unwrap_err();
        assert_eq!(err, GraphError::EmptyPlan);
    }

    #[test]
    fn test_reverse_graph_renders() {
        let graph = FilterGraphBuilder::new()
            .build(&segs(), GraphMode::Reverse)
            .unwrap();
        let rendered = graph.render();
        assert!(rendered.starts_with(
            "[0:v]trim=start=1.000:end=2.500,setpts=PTS-STARTPTS,reverse[v0];"
        ));
        assert!(rendered.contains("[0:a]atrim=start=0.250:end=1.000,asetpts=PTS-STARTPTS,areverse[a1]"));
        assert!(rendered.contains("[v0][v1][v2]concat=n=3:v=1:a=0[outv]"));
        assert!(rendered.ends_with("[a0][a1][a2]concat=n=3:v=0:a=1[outa]"));
    }

    #[test]
    fn test_forward_graph_has_no_reverse() {
        let graph = FilterGraphBuilder::new()
            .build(&segs(), GraphMode::Forward)
            .unwrap();
        assert!(!graph.render().contains("reverse"));
    }

    #[test]
    fn test_stutter_labels() {
        let mut segments = vec![Segment::new(0.0, 2.0)];
        segments.extend((0..10).map(|i| Segment::new(i as f64 * 0.3, i as f64 * 0.3 + 0.1)));
        let graph = FilterGraphBuilder::new()
            .build(&segments, GraphMode::Stutter)
            .unwrap();
        let rendered = graph.render();
        assert!(rendered.contains("[vrepeat]"));
        assert!(rendered.contains("[ascramble10]"));
        assert!(rendered.contains("concat=n=11:v=1:a=0[outv]"));
        assert_eq!(graph.trim_count(Track::Video), 11);
    }

    #[test]
    fn test_stutter_needs_scramble_segments() {
        let err = FilterGraphBuilder::new()
            .build(&[Segment::new(0.0, 1.0)], GraphMode::Stutter)
            .unwrap_err();
        assert_eq!(err, GraphError::StutterTooShort(1));
    }

    #[test]
    fn test_video_only_graph() {
        let graph = FilterGraphBuilder::new()
            .with_audio(false)
            .build(&segs(), GraphMode::Reverse)
            .unwrap();
        assert!(!graph.has_audio());
        assert_eq!(graph.trim_count(Track::Audio), 0);
        assert_eq!(
            graph.to_args()[2..],
            ["-map".to_string(), "[outv]".to_string()]
        );
    }

    #[test]
    fn test_to_args_maps_both_outputs() {
        let graph = FilterGraphBuilder::new()
            .build(&segs(), GraphMode::Reverse)
            .unwrap();
        let args = graph.to_args();
        assert_eq!(args[0], "-filter_complex");
        assert_eq!(&args[2..], ["-map", "[outv]", "-map", "[outa]"]);
    }

    #[test]
    fn test_invalid_segment_rejected() {
        let err = FilterGraphBuilder::new()
            .build(&[Segment::new(2.0, 2.0)], GraphMode::Forward)
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidSegment { index: 0, .. }));
    }

    #[test]
    fn test_validate_catches_dangling_node() {
        let mut graph = FilterGraphBuilder::new()
            .build(&segs(), GraphMode::Forward)
            .unwrap();
        graph.concats[0].inputs.pop();
        assert!(graph.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_graph_is_balanced(seed in any::<u64>(), count in 1usize..12, reverse in any::<bool>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let segments = plan_segments(&mut rng, 20.0, count, 0.5, 2.0).unwrap();
            let mode = if reverse { GraphMode::Reverse } else { GraphMode::Forward };
            let graph = FilterGraphBuilder::new().build(&segments, mode).unwrap();

            prop_assert_eq!(graph.trim_count(Track::Video), count);
            prop_assert_eq!(graph.trim_count(Track::Audio), count);
            prop_assert_eq!(graph.concats().len(), 2);
            prop_assert!(graph.validate().is_ok());

            // Video and audio inputs pair up by segment index.
            let video = &graph.concats()[0].inputs;
            let audio = &graph.concats()[1].inputs;
            for (v, a) in video.iter().zip(audio) {
                prop_assert_eq!(&v[1..], &a[1..]);
            }
        }
    }
}
