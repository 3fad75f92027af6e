//! Configuration parsing and validation

use crate::constants;
use crate::error::{MeterError, MeterResult};
use crate::pipeline::DisplayRange;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments for the soundmeter application
#[derive(Parser)]
#[command(name = "soundmeter")]
#[command(about = "Sound level meter with smoothed dB gauge, rolling average and peak")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a live meter for an audio input device
    Live(LiveArgs),
    /// Measure the level of a WAV file
    File(FileArgs),
    /// Monitor an input device and report average and peak levels
    Measure(MeasureArgs),
    /// List available audio input devices
    List(ListArgs),
}

/// Named display ranges
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePreset {
    /// dBFS clamped to [-100, 0]
    Dbfs,
    /// dBFS shifted up by --shift and clamped to [0, shift]
    Positive,
    /// dB relative to --reference, clamped to [--floor, --ceiling]
    Reference,
}

/// Pipeline tuning shared by every metering command
#[derive(ClapArgs, Debug, Clone)]
pub struct PipelineArgs {
    /// Weight kept from the previous value, 0 (none) to 1 (frozen)
    #[arg(long, default_value_t = constants::smoothing::SMOOTHING_FACTOR)]
    pub smoothing: f32,

    /// Number of smoothed values in the rolling average
    #[arg(long, default_value_t = constants::smoothing::HISTORY_WINDOW_SIZE)]
    pub history: usize,

    /// Pipeline tick interval in milliseconds
    #[arg(long, default_value_t = constants::smoothing::TICK_INTERVAL_MS)]
    pub tick_ms: u64,

    /// Guard added to the RMS before taking the logarithm
    #[arg(long, default_value_t = constants::audio::EPSILON)]
    pub epsilon: f32,

    /// Multiplier applied to raw dB before the offset
    #[arg(long, default_value_t = constants::display::SCALE, allow_hyphen_values = true)]
    pub scale: f32,

    /// Offset added to scaled dB (e.g. 130 for a positive scale)
    #[arg(long, default_value_t = constants::display::OFFSET_DB, allow_hyphen_values = true)]
    pub offset: f32,

    /// Lowest displayed value
    #[arg(long, default_value_t = constants::display::FLOOR_DB, allow_hyphen_values = true)]
    pub floor: f32,

    /// Highest displayed value
    #[arg(long, default_value_t = constants::display::CEILING_DB, allow_hyphen_values = true)]
    pub ceiling: f32,

    /// Build the display range from a preset instead of --scale/--offset
    #[arg(long, value_enum)]
    pub preset: Option<RangePreset>,

    /// Shift used by the positive preset
    #[arg(
        long,
        default_value_t = constants::display::POSITIVE_SHIFT_DB,
        allow_hyphen_values = true
    )]
    pub shift: f32,

    /// Reference amplitude used by the reference preset
    #[arg(long, default_value_t = constants::display::REFERENCE_AMPLITUDE)]
    pub reference: f32,
}

impl PipelineArgs {
    fn display_range(&self) -> MeterResult<DisplayRange> {
        match self.preset {
            None => Ok(DisplayRange {
                scale: self.scale,
                offset: self.offset,
                floor: self.floor,
                ceiling: self.ceiling,
            }),
            Some(RangePreset::Dbfs) => Ok(DisplayRange::dbfs()),
            Some(RangePreset::Positive) => DisplayRange::positive(self.shift),
            Some(RangePreset::Reference) => {
                DisplayRange::reference_relative(self.reference, self.floor, self.ceiling)
            }
        }
    }
}

#[derive(Parser)]
pub struct LiveArgs {
    /// Audio input device name (optional, uses default if not specified)
    #[arg(long)]
    pub device: Option<String>,

    /// Constant added to the numbers shown on screen
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub label_shift: f32,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Parser)]
pub struct FileArgs {
    /// Path to a WAV file
    pub path: PathBuf,

    /// Print one line per pipeline tick
    #[arg(long)]
    pub timeline: bool,

    /// Feed blocks at the tick interval instead of as fast as possible
    #[arg(long)]
    pub realtime: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Parser)]
pub struct MeasureArgs {
    /// Monitoring duration in seconds (optional, runs until Enter if not specified)
    #[arg(long)]
    pub seconds: Option<f32>,

    /// Audio input device name (optional, uses default if not specified)
    #[arg(long)]
    pub device: Option<String>,

    /// Output only the integer values without labels
    #[arg(long)]
    pub quiet: bool,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Parser)]
pub struct ListArgs {}

/// Validated loudness pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub epsilon: f32,
    pub smoothing_factor: f32,
    pub history_window_size: usize,
    pub display: DisplayRange,
    pub tick_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            epsilon: constants::audio::EPSILON,
            smoothing_factor: constants::smoothing::SMOOTHING_FACTOR,
            history_window_size: constants::smoothing::HISTORY_WINDOW_SIZE,
            display: DisplayRange {
                scale: constants::display::SCALE,
                offset: constants::display::OFFSET_DB,
                floor: constants::display::FLOOR_DB,
                ceiling: constants::display::CEILING_DB,
            },
            tick_interval_ms: constants::smoothing::TICK_INTERVAL_MS,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from pipeline arguments
    pub fn from_args(args: &PipelineArgs) -> MeterResult<Self> {
        let config = PipelineConfig {
            epsilon: args.epsilon,
            smoothing_factor: args.smoothing,
            history_window_size: args.history,
            display: args.display_range()?,
            tick_interval_ms: args.tick_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> MeterResult<()> {
        if !(0.0..=1.0).contains(&self.smoothing_factor) {
            return Err(MeterError::config(format!(
                "Smoothing factor must be between 0 and 1, got {}",
                self.smoothing_factor
            )));
        }

        if self.history_window_size == 0 {
            return Err(MeterError::config("History window size must be positive"));
        }

        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(MeterError::config(format!(
                "Epsilon must be a small positive number, got {}",
                self.epsilon
            )));
        }

        self.display.validate()?;

        let max_tick = constants::smoothing::MAX_TICK_INTERVAL_MS;
        if self.tick_interval_ms == 0 || self.tick_interval_ms > max_tick {
            return Err(MeterError::config(format!(
                "Tick interval must be between 1 and {} ms, got {}",
                max_tick, self.tick_interval_ms
            )));
        }

        Ok(())
    }

    /// Value the smoothed level, peak and empty average start from
    pub fn baseline(&self) -> f32 {
        self.display.floor
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Samples per block so one block covers one tick at `sample_rate`
    pub fn block_len(&self, sample_rate: u32) -> usize {
        let samples = (sample_rate as u64).saturating_mul(self.tick_interval_ms) / 1000;
        usize::try_from(samples).unwrap_or(usize::MAX).max(1)
    }
}

/// Validate an optional monitoring duration
pub fn validate_seconds(seconds: Option<f32>) -> MeterResult<Option<Duration>> {
    let Some(seconds) = seconds else {
        return Ok(None);
    };
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(MeterError::config(format!("Seconds must be positive, got {}", seconds)));
    }
    Duration::try_from_secs_f32(seconds)
        .map(Some)
        .map_err(|e| MeterError::config(format!("Seconds out of range ({}): {}", seconds, e)))
}
