//! Adaptive inference scheduling.
//!
//! Inference runs on tick `t` iff `t % (skip + 1) == 0`; the frames in
//! between pass through. `skip = 0` infers on every frame.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

use crate::detect::DetectionOracle;
use crate::frame::{DisplayFrame, Frame};

/// What a pass-through tick shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReusePolicy {
    /// The freshly captured frame, unannotated.
    #[default]
    Raw,
    /// The most recent annotated frame, when one exists.
    LastAnnotated,
}

impl FromStr for ReusePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "last_annotated" | "last-annotated" => Ok(Self::LastAnnotated),
            other => Err(anyhow!(
                "unknown reuse policy '{}'; expected raw or last_annotated",
                other
            )),
        }
    }
}

impl fmt::Display for ReusePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::LastAnnotated => "last_annotated",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Infer,
    PassThrough,
}

pub struct AdaptiveScheduler {
    skip: u32,
    policy: ReusePolicy,
    tick: u64,
    inferences: u64,
    failures: u64,
    last_annotated: Option<Frame>,
}

impl AdaptiveScheduler {
    pub fn new(skip: u32, policy: ReusePolicy) -> Self {
        Self {
            skip,
            policy,
            tick: 0,
            inferences: 0,
            failures: 0,
            last_annotated: None,
        }
    }

    pub fn outcome_for(&self, tick: u64) -> TickOutcome {
        if tick % (u64::from(self.skip) + 1) == 0 {
            TickOutcome::Infer
        } else {
            TickOutcome::PassThrough
        }
    }

    /// Produce the display frame for one captured frame and advance the tick.
    ///
    /// Inference failures never escape: the tick degrades to the raw frame
    /// and the annotated cache keeps its previous value.
    pub fn process(&mut self, frame: Frame, oracle: &mut dyn DetectionOracle) -> DisplayFrame {
        let tick = self.tick;
        self.tick += 1;

        match self.outcome_for(tick) {
            TickOutcome::Infer => match self.infer(&frame, oracle) {
                Ok(annotated) => {
                    self.inferences += 1;
                    self.last_annotated = Some(annotated.clone());
                    DisplayFrame::Annotated(annotated)
                }
                Err(err) => {
                    self.failures += 1;
                    log::warn!(
                        "tick {}: {} inference failed, showing raw frame: {:#}",
                        tick,
                        oracle.name(),
                        err
                    );
                    DisplayFrame::Raw(frame)
                }
            },
            TickOutcome::PassThrough => match (self.policy, &self.last_annotated) {
                (ReusePolicy::LastAnnotated, Some(cached)) => DisplayFrame::Reused(cached.clone()),
                _ => DisplayFrame::Raw(frame),
            },
        }
    }

    fn infer(&self, frame: &Frame, oracle: &mut dyn DetectionOracle) -> Result<Frame> {
        let result = oracle.infer(frame)?;
        log::debug!(
            "frame {}: {} detection(s) from {}",
            frame.seq,
            result.detections.len(),
            oracle.name()
        );
        result.annotate(frame)
    }

    /// Ticks processed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn inferences(&self) -> u64 {
        self.inferences
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn skip(&self) -> u32 {
        self.skip
    }

    pub fn policy(&self) -> ReusePolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionResult, StubOracle};

    struct FailingOracle;

    impl DetectionOracle for FailingOracle {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn infer(&mut self, _frame: &Frame) -> Result<DetectionResult> {
            Err(anyhow!("model crashed"))
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::from_rgb(vec![0u8; 30 * 30 * 3], 30, 30, seq).unwrap()
    }

    #[test]
    fn zero_skip_infers_every_tick() {
        let scheduler = AdaptiveScheduler::new(0, ReusePolicy::Raw);
        assert!((0..10).all(|t| scheduler.outcome_for(t) == TickOutcome::Infer));
    }

    #[test]
    fn skip_three_infers_every_fourth_tick() {
        let scheduler = AdaptiveScheduler::new(3, ReusePolicy::Raw);
        let inferred: Vec<u64> = (0..13)
            .filter(|&t| scheduler.outcome_for(t) == TickOutcome::Infer)
            .collect();
        assert_eq!(inferred, vec![0, 4, 8, 12]);
    }

    #[test]
    fn raw_policy_annotates_ceil_share_in_order() {
        for (skip, count) in [(0u32, 5u64), (3, 10), (2, 7)] {
            let mut scheduler = AdaptiveScheduler::new(skip, ReusePolicy::Raw);
            let mut oracle = StubOracle::new();
            let shown: Vec<DisplayFrame> = (0..count)
                .map(|seq| scheduler.process(frame(seq), &mut oracle))
                .collect();

            assert_eq!(shown.len() as u64, count);
            let annotated = shown.iter().filter(|d| d.is_annotated()).count() as u64;
            let period = u64::from(skip) + 1;
            assert_eq!(annotated, (count + period - 1) / period);
            let seqs: Vec<u64> = shown.iter().map(|d| d.frame().seq).collect();
            assert_eq!(seqs, (0..count).collect::<Vec<_>>());
            assert_eq!(oracle.calls(), annotated);
            assert_eq!(scheduler.ticks(), count);
        }
    }

    #[test]
    fn failed_inference_shows_raw_frame() {
        let mut scheduler = AdaptiveScheduler::new(0, ReusePolicy::LastAnnotated);
        let input = frame(0);
        let shown = scheduler.process(input.clone(), &mut FailingOracle);

        assert!(matches!(shown, DisplayFrame::Raw(_)));
        assert!(shown.frame().same_pixels(&input));
        assert_eq!(scheduler.failures(), 1);
        assert_eq!(scheduler.inferences(), 0);
        assert_eq!(scheduler.ticks(), 1);
    }

    #[test]
    fn last_annotated_policy_reuses_cache() {
        let mut scheduler = AdaptiveScheduler::new(2, ReusePolicy::LastAnnotated);
        let mut oracle = StubOracle::new();

        let first = scheduler.process(frame(0), &mut oracle);
        let second = scheduler.process(frame(1), &mut oracle);
        let third = scheduler.process(frame(2), &mut oracle);

        assert!(first.is_annotated());
        assert!(matches!(second, DisplayFrame::Reused(_)));
        assert!(second.frame().same_pixels(first.frame()));
        assert!(third.frame().same_pixels(first.frame()));
    }

    #[test]
    fn last_annotated_policy_without_cache_falls_back_to_raw() {
        let mut scheduler = AdaptiveScheduler::new(1, ReusePolicy::LastAnnotated);
        scheduler.process(frame(0), &mut FailingOracle);
        let input = frame(1);
        let shown = scheduler.process(input.clone(), &mut StubOracle::new());
        assert!(matches!(shown, DisplayFrame::Raw(_)));
        assert!(shown.frame().same_pixels(&input));
    }

    #[test]
    fn parses_reuse_policy() {
        assert_eq!("raw".parse::<ReusePolicy>().unwrap(), ReusePolicy::Raw);
        assert_eq!(
            "Last_Annotated".parse::<ReusePolicy>().unwrap(),
            ReusePolicy::LastAnnotated
        );
        assert!("sometimes".parse::<ReusePolicy>().is_err());
    }
}
