//! Sample formats and channel handling

/// A PCM sample that can be normalized to `[-1.0, 1.0]`.
///
/// Integer formats subtract their midpoint and divide by half their range.
/// Float samples pass through untouched; range and finiteness are checked
/// later by the pipeline.
pub trait Sample: Copy {
    fn to_normalized(self) -> f32;
}

impl Sample for f32 {
    fn to_normalized(self) -> f32 {
        self
    }
}

impl Sample for f64 {
    fn to_normalized(self) -> f32 {
        self as f32
    }
}

impl Sample for i16 {
    fn to_normalized(self) -> f32 {
        self as f32 / 32_768.0
    }
}

impl Sample for i32 {
    fn to_normalized(self) -> f32 {
        (self as f64 / 2_147_483_648.0) as f32
    }
}

impl Sample for u8 {
    fn to_normalized(self) -> f32 {
        (self as f32 - 128.0) / 128.0
    }
}

impl Sample for u16 {
    fn to_normalized(self) -> f32 {
        (self as f32 - 32_768.0) / 32_768.0
    }
}

/// Normalize interleaved samples and average each frame down to mono.
///
/// A trailing partial frame is averaged over the samples it has.
pub fn append_downmixed<T: Sample>(buf: &mut Vec<f32>, data: &[T], channels: usize) {
    if channels <= 1 {
        buf.extend(data.iter().map(|s| s.to_normalized()));
        return;
    }

    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().map(|s| s.to_normalized()).sum();
        buf.push(sum / frame.len() as f32);
    }
}
