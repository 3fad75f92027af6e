//! Loudness estimation and smoothing pipeline
//!
//! Turns sample blocks into a display-ready dB value with a rolling average
//! over the last few ticks and a running peak. The pipeline owns all of its
//! state; callers hold it by `&mut` on the consumer side of the audio queue.

use crate::config::PipelineConfig;
use crate::error::{MeterError, MeterResult};
use crate::sample::Sample;
use crate::smoothing;
use std::collections::VecDeque;

/// Linear map-then-clamp policy: `clamp(db * scale + offset, floor, ceiling)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRange {
    pub scale: f32,
    pub offset: f32,
    pub floor: f32,
    pub ceiling: f32,
}

impl DisplayRange {
    /// Plain dBFS clamped to `[-100, 0]`
    pub fn dbfs() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
            floor: -100.0,
            ceiling: 0.0,
        }
    }

    /// Shift dBFS up by `shift` and clamp to `[0, shift]`
    pub fn positive(shift: f32) -> MeterResult<Self> {
        let range = Self {
            scale: 1.0,
            offset: shift,
            floor: 0.0,
            ceiling: shift,
        };
        range.validate()?;
        Ok(range)
    }

    /// dB relative to a reference amplitude instead of full scale
    pub fn reference_relative(reference: f32, floor: f32, ceiling: f32) -> MeterResult<Self> {
        if !reference.is_finite() || reference <= 0.0 {
            return Err(MeterError::config(format!(
                "Reference amplitude must be positive, got {}",
                reference
            )));
        }
        let range = Self {
            scale: 1.0,
            offset: -20.0 * reference.log10(),
            floor,
            ceiling,
        };
        range.validate()?;
        Ok(range)
    }

    /// Finite bounds with `floor < ceiling`, finite scale and offset
    pub fn validate(&self) -> MeterResult<()> {
        if !self.floor.is_finite() || !self.ceiling.is_finite() || self.floor >= self.ceiling {
            return Err(MeterError::config(format!(
                "Display floor must be below the ceiling, got {} and {}",
                self.floor, self.ceiling
            )));
        }

        if !self.scale.is_finite() || !self.offset.is_finite() {
            return Err(MeterError::config("Display scale and offset must be finite"));
        }

        Ok(())
    }
}

impl Default for DisplayRange {
    fn default() -> Self {
        Self::dbfs()
    }
}

/// One pipeline output, ready for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    pub value: f32,
    pub average: f32,
    pub peak: f32,
}

/// Map a raw dB value into the configured display range.
///
/// The result is always within `[floor, ceiling]`; NaN lands on the floor.
/// Bounds given the wrong way round are swapped rather than trusted.
pub fn map_to_display_range(db: f32, range: &DisplayRange) -> f32 {
    let mapped = db * range.scale + range.offset;
    if mapped.is_nan() {
        return range.floor;
    }
    let (lo, hi) = if range.floor <= range.ceiling {
        (range.floor, range.ceiling)
    } else {
        (range.ceiling, range.floor)
    };
    mapped.max(lo).min(hi)
}

/// Fraction of the gauge a value fills, in `[0, 1]`
pub fn gauge_ratio(value: f32, floor: f32, ceiling: f32) -> f64 {
    let span = ceiling - floor;
    if span.is_nan() || span <= 0.0 || value.is_nan() {
        return 0.0;
    }
    ((value - floor) / span).clamp(0.0, 1.0) as f64
}

/// RMS of a block after normalization, along with how many samples had to
/// be replaced because they were not finite
fn block_rms<S: Sample>(block: &[S]) -> (f32, usize) {
    let mut degenerate = 0usize;
    let sum_squares: f64 = block
        .iter()
        .map(|s| {
            let x = s.to_normalized();
            let x = if x.is_finite() {
                x.clamp(-1.0, 1.0)
            } else {
                degenerate += 1;
                0.0
            };
            (x as f64) * (x as f64)
        })
        .sum();

    ((sum_squares / block.len() as f64).sqrt() as f32, degenerate)
}

/// Stateful loudness meter
#[derive(Debug, Clone)]
pub struct LoudnessPipeline {
    config: PipelineConfig,
    smoothed: f32,
    history: VecDeque<f32>,
    peak: f32,
    ticks: u64,
}

impl LoudnessPipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: PipelineConfig) -> MeterResult<Self> {
        config.validate()?;
        let baseline = config.baseline();
        Ok(Self {
            history: VecDeque::with_capacity(config.history_window_size),
            config,
            smoothed: baseline,
            peak: baseline,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Instantaneous dB estimate for one block, before mapping and smoothing.
    ///
    /// Does not touch pipeline state. Empty blocks are rejected.
    pub fn ingest<S: Sample>(&self, block: &[S]) -> MeterResult<f32> {
        if block.is_empty() {
            return Err(MeterError::invalid_input("sample block is empty"));
        }

        let (rms, degenerate) = block_rms(block);
        if degenerate > 0 {
            tracing::debug!(
                degenerate,
                len = block.len(),
                "replaced non-finite samples with silence"
            );
        }

        Ok(smoothing::amplitude_to_db(rms, self.config.epsilon))
    }

    /// Run one full tick: ingest, map, smooth, then update history and peak
    pub fn tick<S: Sample>(&mut self, block: &[S]) -> MeterResult<MeterReading> {
        let db = self.ingest(block)?;
        Ok(self.advance(db))
    }

    /// Feed an already computed dB reading through map, smooth and statistics
    pub fn advance(&mut self, db: f32) -> MeterReading {
        let mapped = map_to_display_range(db, &self.config.display);
        self.smoothed = smoothing::smooth(self.smoothed, mapped, self.config.smoothing_factor);

        self.history.push_back(self.smoothed);
        while self.history.len() > self.config.history_window_size {
            self.history.pop_front();
        }

        self.peak = self.peak.max(self.smoothed);
        self.ticks += 1;

        self.reading()
    }

    /// Latest value and statistics without advancing
    pub fn reading(&self) -> MeterReading {
        MeterReading {
            value: self.smoothed,
            average: self.average(),
            peak: self.peak,
        }
    }

    /// Mean of the history window, or the baseline when it is empty
    pub fn average(&self) -> f32 {
        if self.history.is_empty() {
            return self.config.baseline();
        }
        let sum: f64 = self.history.iter().map(|&v| v as f64).sum();
        (sum / self.history.len() as f64) as f32
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    /// Smoothed values currently in the history window, oldest first
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Ticks since construction or the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Return to the freshly constructed state
    pub fn reset(&mut self) {
        let baseline = self.config.baseline();
        self.history.clear();
        self.peak = baseline;
        self.smoothed = baseline;
        self.ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pipeline_with(history: usize, factor: f32, range: DisplayRange) -> LoudnessPipeline {
        let config = PipelineConfig {
            history_window_size: history,
            smoothing_factor: factor,
            display: range,
            ..PipelineConfig::default()
        };
        LoudnessPipeline::new(config).unwrap()
    }

    fn open_range() -> DisplayRange {
        DisplayRange {
            scale: 1.0,
            offset: 0.0,
            floor: 0.0,
            ceiling: 100.0,
        }
    }

    #[test]
    fn silent_block_is_finite() {
        let pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        let db = pipeline.ingest(&[0.0f32; 256]).unwrap();
        assert!(db.is_finite());
        assert!((db - 20.0 * 1e-6f32.log10()).abs() < 1e-3);
    }

    #[test]
    fn full_scale_block_is_near_zero_db() {
        let pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        let db = pipeline.ingest(&[1.0f32; 256]).unwrap();
        assert!(db.abs() < 1e-3);

        let alternating: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(pipeline.ingest(&alternating).unwrap().abs() < 1e-3);
    }

    #[test]
    fn byte_pcm_is_normalized_around_midpoint() {
        let pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        let db = pipeline.ingest(&[128u8; 256]).unwrap();
        assert!((db - -120.0).abs() < 1e-2);

        let db = pipeline.ingest(&[i16::MIN; 64]).unwrap();
        assert!(db.abs() < 1e-3);
    }

    #[test]
    fn non_finite_samples_become_silence() {
        let pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        let db = pipeline.ingest(&[f32::NAN, f32::INFINITY, f32::NEG_INFINITY]).unwrap();
        assert!(db.is_finite());
        assert!((db - -120.0).abs() < 1e-2);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        let db = pipeline.ingest(&[4.0f32, -7.5, 2.0]).unwrap();
        assert!(db.abs() < 1e-3);
    }

    #[test]
    fn empty_block_is_rejected_without_state_change() {
        let mut pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        pipeline.tick(&[0.5f32; 32]).unwrap();
        let before = pipeline.reading();
        let history_before: Vec<f32> = pipeline.history().collect();

        let empty: [f32; 0] = [];
        let err = pipeline.tick(&empty).unwrap_err();
        assert!(matches!(err, MeterError::InvalidInput(_)));
        assert_eq!(pipeline.reading(), before);
        assert_eq!(pipeline.history().collect::<Vec<_>>(), history_before);
        assert_eq!(pipeline.ticks(), 1);
    }

    #[test]
    fn mapping_clamps_extremes() {
        let range = DisplayRange::dbfs();
        assert_eq!(map_to_display_range(1e9, &range), 0.0);
        assert_eq!(map_to_display_range(-1e9, &range), -100.0);
        assert_eq!(map_to_display_range(f32::INFINITY, &range), 0.0);
        assert_eq!(map_to_display_range(f32::NEG_INFINITY, &range), -100.0);
        assert_eq!(map_to_display_range(f32::NAN, &range), -100.0);
        assert_eq!(map_to_display_range(-42.0, &range), -42.0);
    }

    #[test]
    fn positive_shift_matches_dashboard_scale() {
        let range = DisplayRange::positive(130.0).unwrap();
        assert_eq!(map_to_display_range(-30.0, &range), 100.0);
        assert_eq!(map_to_display_range(-200.0, &range), 0.0);
        assert_eq!(map_to_display_range(5.0, &range), 130.0);
    }

    #[test]
    fn reference_relative_offsets_by_reference_level() {
        let range = DisplayRange::reference_relative(0.1, -60.0, 60.0).unwrap();
        assert!((map_to_display_range(-20.0, &range) - 0.0).abs() < 1e-4);
        assert!((map_to_display_range(0.0, &range) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn presets_reject_unusable_ranges() {
        assert!(matches!(
            DisplayRange::positive(-10.0),
            Err(MeterError::InvalidConfig(_))
        ));
        assert!(DisplayRange::positive(0.0).is_err());
        assert!(DisplayRange::reference_relative(0.0, -60.0, 60.0).is_err());
        assert!(DisplayRange::reference_relative(f32::NAN, -60.0, 60.0).is_err());
        assert!(DisplayRange::reference_relative(0.1, 60.0, -60.0).is_err());
    }

    #[test]
    fn inverted_bounds_map_without_panicking() {
        let range = DisplayRange {
            scale: 1.0,
            offset: -10.0,
            floor: 0.0,
            ceiling: -10.0,
        };
        assert_eq!(map_to_display_range(-50.0, &range), -10.0);
        assert_eq!(map_to_display_range(50.0, &range), 0.0);
        assert_eq!(map_to_display_range(f32::NAN, &range), 0.0);
        assert!(range.validate().is_err());
    }

    #[test]
    fn scaled_policy_applies_scale_before_offset() {
        let range = DisplayRange {
            scale: 1.2,
            offset: 10.0,
            floor: 0.0,
            ceiling: 130.0,
        };
        assert!((map_to_display_range(50.0, &range) - 70.0).abs() < 1e-4);
    }

    #[test]
    fn history_window_evicts_oldest() {
        let mut pipeline = pipeline_with(3, 0.0, open_range());
        let mut last = pipeline.reading();
        for db in [10.0, 20.0, 30.0, 40.0] {
            last = pipeline.advance(db);
        }

        assert_eq!(pipeline.history().collect::<Vec<_>>(), vec![20.0, 30.0, 40.0]);
        assert_eq!(last.value, 40.0);
        assert!((last.average - 30.0).abs() < 1e-4);
        assert_eq!(last.peak, 40.0);
    }

    #[test]
    fn peak_holds_after_level_drops() {
        let mut pipeline = pipeline_with(5, 0.0, open_range());
        pipeline.advance(80.0);
        let reading = pipeline.advance(20.0);
        assert_eq!(reading.peak, 80.0);
        assert_eq!(reading.value, 20.0);
    }

    #[test]
    fn reset_mid_stream_matches_fresh_pipeline() {
        let blocks: Vec<Vec<f32>> = (1..=6).map(|i| vec![i as f32 * 0.1; 128]).collect();

        let mut used = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        for block in &blocks {
            used.tick(block).unwrap();
        }
        used.reset();
        assert_eq!(used.history_len(), 0);
        assert_eq!(used.peak(), -100.0);
        assert_eq!(used.reading().value, -100.0);

        let mut fresh = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        for block in blocks.iter().rev() {
            assert_eq!(used.tick(block).unwrap(), fresh.tick(block).unwrap());
        }
    }

    #[test]
    fn empty_history_reports_baseline() {
        let pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
        let reading = pipeline.reading();
        assert_eq!(reading.average, -100.0);
        assert_eq!(reading.peak, -100.0);
    }

    #[test]
    fn gauge_ratio_covers_range() {
        assert_eq!(gauge_ratio(-100.0, -100.0, 0.0), 0.0);
        assert_eq!(gauge_ratio(0.0, -100.0, 0.0), 1.0);
        assert!((gauge_ratio(-50.0, -100.0, 0.0) - 0.5).abs() < 1e-9);
        assert_eq!(gauge_ratio(5.0, 0.0, 0.0), 0.0);
    }

    proptest! {
        #[test]
        fn mapped_value_stays_in_bounds(
            db in -1.0e9f32..1.0e9,
            scale in -10.0f32..10.0,
            offset in -200.0f32..200.0,
        ) {
            let range = DisplayRange { scale, offset, floor: -100.0, ceiling: 0.0 };
            let mapped = map_to_display_range(db, &range);
            prop_assert!((-100.0..=0.0).contains(&mapped));
        }

        #[test]
        fn mapped_value_stays_between_bounds_in_any_order(
            db in -1.0e9f32..1.0e9,
            floor in -1.0e3f32..1.0e3,
            ceiling in -1.0e3f32..1.0e3,
        ) {
            let range = DisplayRange { scale: 1.0, offset: 0.0, floor, ceiling };
            let mapped = map_to_display_range(db, &range);
            prop_assert!(mapped >= floor.min(ceiling));
            prop_assert!(mapped <= floor.max(ceiling));
        }

        #[test]
        fn history_never_exceeds_capacity(
            capacity in 1usize..20,
            readings in prop::collection::vec(-150.0f32..10.0, 1..100),
        ) {
            let mut pipeline = pipeline_with(capacity, 0.3, DisplayRange::dbfs());
            for db in readings {
                pipeline.advance(db);
                prop_assert!(pipeline.history_len() <= capacity);
            }
        }

        #[test]
        fn peak_is_monotonic_until_reset(
            blocks in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 1..64), 1..40),
        ) {
            let mut pipeline = LoudnessPipeline::new(PipelineConfig::default()).unwrap();
            let mut previous_peak = pipeline.peak();
            for block in &blocks {
                let reading = pipeline.tick(block).unwrap();
                prop_assert!(reading.peak >= previous_peak);
                prop_assert!(reading.peak >= reading.value);
                prop_assert!(reading.value.is_finite());
                previous_peak = reading.peak;
            }
            pipeline.reset();
            prop_assert_eq!(pipeline.peak(), -100.0);
        }
    }
}
