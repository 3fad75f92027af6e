//! WAV file decoding and file-backed audio source

use crate::audio::{AudioSource, BlockSender, SourceEvent, SourceHandle, SourceInfo};
use crate::error::{MeterError, MeterResult};
use crate::sample::append_downmixed;
use hound::{SampleFormat, WavReader};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Whole-file facts shown before the block-by-block run
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    pub info: SourceInfo,
    pub duration_secs: f64,
    /// `None` for an all-zero file
    pub level_db: Option<f32>,
}

/// Decode interleaved samples to normalized floats and average channels to mono
fn decode<R: Read>(reader: WavReader<R>) -> MeterResult<Vec<f32>> {
    let spec = reader.spec();
    let mut interleaved = Vec::with_capacity(reader.len() as usize);

    match spec.sample_format {
        SampleFormat::Float => {
            for sample in reader.into_samples::<f32>() {
                interleaved.push(sample?);
            }
        }
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(MeterError::unavailable(format!(
                    "Unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f64;
            for sample in reader.into_samples::<i32>() {
                interleaved.push((sample? as f64 / full_scale) as f32);
            }
        }
    }

    let mut mono = Vec::with_capacity(interleaved.len() / spec.channels.max(1) as usize);
    append_downmixed(&mut mono, &interleaved, spec.channels as usize);
    Ok(mono)
}

/// Level of the whole signal in dBFS, `None` when it is silent throughout.
///
/// Non-finite samples count as silence, the same as in the meter itself.
pub fn overall_level_db(samples: &[f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| if s.is_finite() { s as f64 } else { 0.0 })
        .map(|s| s * s)
        .sum();
    let rms = (sum_squares / samples.len() as f64).sqrt();
    if rms > 0.0 {
        Some((20.0 * rms.log10()) as f32)
    } else {
        None
    }
}

/// Audio source that replays a decoded WAV file
pub struct FileSource {
    info: SourceInfo,
    samples: Arc<Vec<f32>>,
    pacing: Option<Duration>,
}

impl FileSource {
    /// Decode a WAV file from disk
    pub fn open(path: &Path) -> MeterResult<Self> {
        let reader = WavReader::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_reader(name, reader)
    }

    pub fn from_reader<R: Read>(name: String, reader: WavReader<R>) -> MeterResult<Self> {
        let spec = reader.spec();
        let info = SourceInfo {
            name,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        };
        let samples = decode(reader)?;

        tracing::info!(
            file = %info.name,
            sample_rate = info.sample_rate,
            channels = info.channels,
            bits = spec.bits_per_sample,
            frames = samples.len(),
            "decoded audio file"
        );

        Ok(Self {
            info,
            samples: Arc::new(samples),
            pacing: None,
        })
    }

    /// Sleep `interval` between blocks so the file plays back at tick speed
    pub fn with_pacing(mut self, interval: Duration) -> Self {
        self.pacing = Some(interval);
        self
    }

    /// Mono samples after decoding
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn summary(&self) -> FileSummary {
        let duration_secs = if self.info.sample_rate > 0 {
            self.samples.len() as f64 / self.info.sample_rate as f64
        } else {
            0.0
        };
        FileSummary {
            info: self.info.clone(),
            duration_secs,
            level_db: overall_level_db(&self.samples),
        }
    }
}

impl AudioSource for FileSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn start(&mut self, queue: BlockSender, block_len: usize) -> MeterResult<SourceHandle> {
        let block_len = block_len.max(1);
        let samples = Arc::clone(&self.samples);
        let pacing = self.pacing;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("soundmeter-file".to_string())
            .spawn(move || {
                for chunk in samples.chunks(block_len) {
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    if queue.blocking_send(SourceEvent::Block(chunk.to_vec())).is_err() {
                        break;
                    }
                    if let Some(interval) = pacing {
                        std::thread::sleep(interval);
                    }
                }
                tracing::debug!("file source finished");
            })?;

        Ok(SourceHandle::worker(thread, stop))
    }
}
