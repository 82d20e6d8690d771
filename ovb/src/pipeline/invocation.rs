//! Turning an operation into an engine invocation.

use std::path::Path;

use filtergraph::{FilterGraphBuilder, GraphMode, Segment, SpanRequest};
use media_types::MediaKind;
use rand::RngExt;

use crate::domain::Operation;
use crate::engine::{Descriptor, EngineInvocation, MediaProbe};
use crate::{Error, Result};

const YTP_SEGMENTS: SpanRequest = SpanRequest::new(3, 0.5, 2.0);
const STUTTER_REPEAT: SpanRequest = SpanRequest::new(1, 1.0, 3.0);
const STUTTER_SCRAMBLE: SpanRequest = SpanRequest::new(10, 0.1, 0.1);

/// Seconds of video made from a still image.
const STILL_SECONDS: u32 = 10;
const GIF_FPS: u32 = 10;

/// atempo only takes factors in [0.5, 2.0]; larger changes are chained.
pub fn atempo_chain(factor: f64) -> String {
    let mut stages = Vec::new();
    let mut remaining = factor;
    while remaining > 2.0 {
        stages.push(2.0);
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push(0.5);
        remaining /= 0.5;
    }
    stages.push(remaining);

    stages
        .iter()
        .map(|s| format!("atempo={}", fmt_num(*s)))
        .collect::<Vec<_>>()
        .join(",")
}

/// `libx264` CRF for a 1 (best) ..= 100 (worst) quality level.
pub fn crf_for_level(level: u8) -> u32 {
    let level = f64::from(level.clamp(1, 100));
    ((level - 1.0) * 51.0 / 99.0).round() as u32
}

/// Build the invocation for `op`.
///
/// Compound operations need a probe of the staged input; simple ones ignore it.
pub fn plan_invocation<R: RngExt + ?Sized>(
    op: &Operation,
    input: &Path,
    input_kind: MediaKind,
    output: &Path,
    probe: Option<&MediaProbe>,
    rng: &mut R,
) -> Result<EngineInvocation> {
    let invocation = match op {
        Operation::Reverse => {
            EngineInvocation::new(input, output, filters(&["-vf", "reverse", "-af", "areverse"]))
        }
        Operation::Speed { factor } => {
            let setpts = format!("setpts={}*PTS", fmt_num(1.0 / factor));
            let atempo = atempo_chain(*factor);
            EngineInvocation::new(
                input,
                output,
                filters(&["-vf", setpts.as_str(), "-af", atempo.as_str()]),
            )
        }
        Operation::Pitch { value } => {
            let af = format!("rubberband=pitch={}", fmt_num(*value));
            EngineInvocation::new(input, output, filters(&["-af", af.as_str()]))
        }
        Operation::Quality { level } => {
            let crf = crf_for_level(*level).to_string();
            EngineInvocation::new(
                input,
                output,
                filters(&["-c:v", "libx264", "-crf", crf.as_str()]),
            )
        }
        Operation::Volume { factor } => {
            let af = format!("volume={}", fmt_num(*factor));
            EngineInvocation::new(input, output, filters(&["-af", af.as_str()]))
        }
        Operation::Fps { value } => {
            let vf = format!("fps={}", value);
            EngineInvocation::new(input, output, filters(&["-vf", vf.as_str()]))
        }
        Operation::Repu { seconds } => {
            let t = seconds.to_string();
            EngineInvocation::new(input, output, filters(&["-t", t.as_str()]))
                .with_input_args(["-stream_loop", "-1"])
        }
        Operation::Hue { value } => {
            let vf = format!("hue=h={}", fmt_num(*value));
            EngineInvocation::new(input, output, filters(&["-vf", vf.as_str()]))
        }
        Operation::ToVid => {
            if input_kind != MediaKind::Image {
                return Err(Error::validation("tovid needs an image"));
            }
            EngineInvocation::new(
                input,
                output,
                filters(&["-c:v", "libx264", "-pix_fmt", "yuv420p"]),
            )
            .with_input_args([
                "-loop".to_string(),
                "1".to_string(),
                "-t".to_string(),
                STILL_SECONDS.to_string(),
            ])
        }
        Operation::ToGif => {
            let vf = format!("fps={}", GIF_FPS);
            EngineInvocation::new(input, output, filters(&["-vf", vf.as_str(), "-f", "gif"]))
        }
        Operation::Ytp | Operation::Stutter => {
            let probe = probe.ok_or_else(|| {
                Error::validation(format!("{} needs the input duration", op.name()))
            })?;
            let (segments, mode) = plan_compound(op, probe.duration, rng)?;
            let graph = FilterGraphBuilder::new()
                .with_audio(probe.has_audio)
                .build(&segments, mode)?;
            EngineInvocation::new(input, output, Descriptor::Graph(graph))
        }
        Operation::Download { .. } => {
            return Err(Error::validation("download does not run the media engine"));
        }
    };
    Ok(invocation)
}

fn plan_compound<R: RngExt + ?Sized>(
    op: &Operation,
    duration: f64,
    rng: &mut R,
) -> Result<(Vec<Segment>, GraphMode)> {
    match op {
        Operation::Ytp => Ok((YTP_SEGMENTS.plan(rng, duration)?, GraphMode::Reverse)),
        Operation::Stutter => {
            // Both requests are checked before drawing anything.
            STUTTER_REPEAT.check(duration)?;
            STUTTER_SCRAMBLE.check(duration)?;
            let mut segments = STUTTER_REPEAT.plan(rng, duration)?;
            segments.extend(STUTTER_SCRAMBLE.plan(rng, duration)?);
            Ok((segments, GraphMode::Stutter))
        }
        other => Err(Error::validation(format!(
            "{} is not a compound operation",
            other.name()
        ))),
    }
}

fn filters(args: &[&str]) -> Descriptor {
    Descriptor::Filters(args.iter().map(|a| a.to_string()).collect())
}

/// Shortest decimal form: `2` not `2.0`, `0.5` stays `0.5`.
fn fmt_num(value: f64) -> String {
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filtergraph::Track;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn plan(op: &Operation, probe: Option<&MediaProbe>) -> Result<EngineInvocation> {
        plan_invocation(
            op,
            Path::new("/w/input_a.mp4"),
            MediaKind::Video,
            Path::new("/w/output_b.mp4"),
            probe,
            &mut rng(),
        )
    }

    fn video(duration: f64, has_audio: bool) -> MediaProbe {
        MediaProbe {
            duration,
            has_video: true,
            has_audio,
        }
    }

    #[test]
    fn test_speed_doubles_rate() {
        let inv = plan(&Operation::Speed { factor: 2.0 }, None).unwrap();
        assert_eq!(
            inv.output_args(),
            ["-vf", "setpts=0.5*PTS", "-af", "atempo=2"]
        );
        assert!(inv.input_args.is_empty());
    }

    #[test]
    fn test_atempo_chain_stays_in_range() {
        assert_eq!(atempo_chain(1.5), "atempo=1.5");
        assert_eq!(atempo_chain(8.0), "atempo=2,atempo=2,atempo=2");
        assert_eq!(atempo_chain(0.25), "atempo=0.5,atempo=0.5");

        for factor in [0.01, 0.3, 3.0, 100.0] {
            let product: f64 = atempo_chain(factor)
                .split(',')
                .map(|s| s.trim_start_matches("atempo=").parse::<f64>().unwrap())
                .inspect(|s| assert!((0.5..=2.0).contains(s), "{factor}: {s}"))
                .product();
            assert!((product - factor).abs() < 1e-4, "{factor}");
        }
    }

    #[test]
    fn test_crf_mapping() {
        assert_eq!(crf_for_level(1), 0);
        assert_eq!(crf_for_level(100), 51);
        assert_eq!(crf_for_level(50), 25);
    }

    #[test]
    fn test_repu_loops_input() {
        let inv = plan(&Operation::Repu { seconds: 12 }, None).unwrap();
        assert_eq!(inv.input_args, ["-stream_loop", "-1"]);
        assert_eq!(inv.output_args(), ["-t", "12"]);
    }

    #[test]
    fn test_tovid_from_still() {
        let inv = plan_invocation(
            &Operation::ToVid,
            Path::new("in.png"),
            MediaKind::Image,
            Path::new("out.mp4"),
            None,
            &mut rng(),
        )
        .unwrap();
        assert_eq!(inv.input_args, ["-loop", "1", "-t", "10"]);
        assert!(inv.output_args().contains(&"yuv420p".to_string()));

        assert!(matches!(plan(&Operation::ToVid, None), Err(Error::Validation(_))));
    }

    #[test]
    fn test_ytp_builds_reversed_graph() {
        let inv = plan(&Operation::Ytp, Some(&video(10.0, true))).unwrap();
        let Descriptor::Graph(graph) = &inv.descriptor else {
            panic!("expected graph");
        };
        assert_eq!(graph.trim_count(Track::Video), 3);
        assert_eq!(graph.trim_count(Track::Audio), 3);
        assert!(graph.render().contains("reverse"));
        assert!(inv.output_args().contains(&"[outa]".to_string()));
    }

    #[test]
    fn test_stutter_without_audio_is_video_only() {
        let inv = plan(&Operation::Stutter, Some(&video(5.0, false))).unwrap();
        let Descriptor::Graph(graph) = &inv.descriptor else {
            panic!("expected graph");
        };
        assert_eq!(graph.trim_count(Track::Video), 11);
        assert!(!graph.has_audio());
        assert!(!inv.output_args().contains(&"[outa]".to_string()));
    }

    #[test]
    fn test_compound_too_short_is_validation() {
        let err = plan(&Operation::Stutter, Some(&video(0.5, true))).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = plan(&Operation::Ytp, None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_same_seed_same_graph() {
        let a = plan(&Operation::Ytp, Some(&video(30.0, true))).unwrap();
        let b = plan(&Operation::Ytp, Some(&video(30.0, true))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(2.0), "2");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(-30.0), "-30");
        assert_eq!(fmt_num(0.0), "0");
    }
}
