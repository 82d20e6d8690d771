//! Randomized segment planning.
//!
//! Segments are drawn independently and may overlap. Each one is trimmed from
//! the same source later on, so overlap only means the same footage appears
//! twice in the output.

use rand::RngExt;
use tracing::trace;

use crate::error::{GraphError, Result};

/// A time range within the source media, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// `0 <= start < end <= duration`.
    pub fn fits_within(&self, duration: f64) -> bool {
        self.start >= 0.0 && self.start < self.end && self.end <= duration
    }
}

/// How many segments to draw and how long each may be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanRequest {
    pub count: usize,
    pub min_span: f64,
    pub max_span: f64,
}

impl SpanRequest {
    pub const fn new(count: usize, min_span: f64, max_span: f64) -> Self {
        Self {
            count,
            min_span,
            max_span,
        }
    }

    /// Check the bounds and that `duration` can hold the shortest span.
    pub fn check(&self, duration: f64) -> Result<()> {
        let bounds_ok = self.min_span.is_finite()
            && self.max_span.is_finite()
            && self.min_span > 0.0
            && self.min_span <= self.max_span;
        if !bounds_ok {
            return Err(GraphError::InvalidBounds {
                min_span: self.min_span,
                max_span: self.max_span,
            });
        }
        if !duration.is_finite() || duration < self.min_span {
            return Err(GraphError::DurationTooShort {
                duration,
                min_span: self.min_span,
            });
        }
        Ok(())
    }

    pub fn plan<R: RngExt + ?Sized>(&self, rng: &mut R, duration: f64) -> Result<Vec<Segment>> {
        plan_segments(rng, duration, self.count, self.min_span, self.max_span)
    }
}

/// Draw `count` segments inside `[0, duration]`.
///
/// Each start is uniform in `[0, duration - min_span)` and each span uniform in
/// `[min_span, max_span]`; the end is clamped to `duration`. When the media is
/// exactly `min_span` long the only valid start is zero.
pub fn plan_segments<R: RngExt + ?Sized>(
    rng: &mut R,
    duration: f64,
    count: usize,
    min_span: f64,
    max_span: f64,
) -> Result<Vec<Segment>> {
    SpanRequest::new(count, min_span, max_span).check(duration)?;

    let latest_start = duration - min_span;
    let segments: Vec<Segment> = (0..count)
        .map(|_| {
            let start = if latest_start > 0.0 {
                rng.random_range(0.0..latest_start)
            } else {
                0.0
            };
            let span = rng.random_range(min_span..=max_span);
            Segment::new(start, (start + span).min(duration))
        })
        .collect();

    trace!(duration, count, min_span, max_span, ?segments, "Planned segments");
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_plan_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let segments = plan_segments(&mut rng, 10.0, 3, 0.5, 2.0).unwrap();
        assert_eq!(segments.len(), 3);
        for seg in &segments {
            assert!(seg.fits_within(10.0), "{seg:?}");
            assert!(seg.span() <= 2.0 + f64::EPSILON);
        }
    }

    #[test]
    fn test_same_seed_same_plan() {
        let a = plan_segments(&mut StdRng::seed_from_u64(42), 30.0, 5, 0.5, 2.0).unwrap();
        let b = plan_segments(&mut StdRng::seed_from_u64(42), 30.0, 5, 0.5, 2.0).unwrap();
        let c = plan_segments(&mut StdRng::seed_from_u64(43), 30.0, 5, 0.5, 2.0).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_duration_equal_to_min_span() {
        let mut rng = StdRng::seed_from_u64(1);
        let segments = plan_segments(&mut rng, 1.0, 2, 1.0, 3.0).unwrap();
        for seg in segments {
            assert_eq!(seg, Segment::new(0.0, 1.0));
        }
    }

    #[test]
    fn test_duration_shorter_than_min_span() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = plan_segments(&mut rng, 0.3, 3, 0.5, 2.0).unwrap_err();
        assert!(matches!(err, GraphError::DurationTooShort { .. }));
    }

    #[test]
    fn test_invalid_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            plan_segments(&mut rng, 10.0, 3, 2.0, 1.0),
            Err(GraphError::InvalidBounds { .. })
        ));
        assert!(matches!(
            plan_segments(&mut rng, 10.0, 3, 0.0, 1.0),
            Err(GraphError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_zero_count_is_empty_not_error() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(plan_segments(&mut rng, 10.0, 0, 0.5, 2.0).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_segments_stay_inside_media(
            seed in any::<u64>(),
            min_span in 0.05f64..5.0,
            extra in 0.0f64..5.0,
            slack in 0.0f64..60.0,
            count in 1usize..16,
        ) {
            let max_span = min_span + extra;
            let duration = max_span + slack;
            let mut rng = StdRng::seed_from_u64(seed);
            let segments = plan_segments(&mut rng, duration, count, min_span, max_span).unwrap();
            prop_assert_eq!(segments.len(), count);
            for seg in segments {
                prop_assert!(seg.start >= 0.0);
                prop_assert!(seg.start < seg.end);
                prop_assert!(seg.end <= duration);
                prop_assert!(seg.span() <= max_span + 1e-9);
            }
        }
    }
}
