//! Application constants and configuration values

/// Audio processing constants
pub mod audio {
    /// Guard added to the RMS before taking the logarithm
    pub const EPSILON: f32 = 1e-6;
    /// Buffer size for audio streams
    pub const BUFFER_SIZE: cpal::BufferSize = cpal::BufferSize::Default;
    /// Sample blocks the capture thread may queue ahead of the tick loop
    pub const QUEUE_CAPACITY: usize = 32;
}

/// Display range constants
pub mod display {
    /// Lower bound of the mapped dB value
    pub const FLOOR_DB: f32 = -100.0;
    /// Upper bound of the mapped dB value
    pub const CEILING_DB: f32 = 0.0;
    /// Linear scale applied before the offset
    pub const SCALE: f32 = 1.0;
    /// Offset added after scaling
    pub const OFFSET_DB: f32 = 0.0;
    /// Shift of the positive preset, matching the dashboard's 0..130 scale
    pub const POSITIVE_SHIFT_DB: f32 = 130.0;
    /// Reference amplitude of the reference-relative preset
    pub const REFERENCE_AMPLITUDE: f32 = 1.0;
}

/// UI display constants
pub mod ui {
    /// UI redraw interval in milliseconds
    pub const UPDATE_INTERVAL_MS: u64 = 33;
    /// Bar width calculation accounts for borders
    pub const BAR_BORDER_WIDTH: usize = 2;
}

/// Smoothing algorithm constants
pub mod smoothing {
    /// Weight of the previous value (higher = smoother)
    pub const SMOOTHING_FACTOR: f32 = 0.3;
    /// Smoothed values kept for the rolling average
    pub const HISTORY_WINDOW_SIZE: usize = 50;
    /// Pipeline tick cadence in milliseconds
    pub const TICK_INTERVAL_MS: u64 = 100;
    /// Longest accepted tick interval
    pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;
}
