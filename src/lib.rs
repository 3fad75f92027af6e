//! Sound level metering: a loudness pipeline that turns audio blocks into a
//! smoothed dB reading with rolling average and peak, plus microphone and
//! WAV file sources and a terminal gauge.

pub mod app;
pub mod audio;
pub mod config;
pub mod constants;
pub mod error;
pub mod file;
pub mod logging;
pub mod pipeline;
pub mod sample;
pub mod smoothing;
pub mod state;
pub mod ui;

pub use error::{MeterError, MeterResult};
pub use pipeline::{DisplayRange, LoudnessPipeline, MeterReading};
