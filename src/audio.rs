//! Audio sources, device handling and the capture queue
//!
//! Sources deliver mono sample blocks into a bounded queue. The consumer side
//! owns the loudness pipeline; nothing here touches meter state.

use crate::error::{MeterError, MeterResult};
use crate::sample::{Sample, append_downmixed};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

/// Message from an audio source to the tick loop
#[derive(Debug)]
pub enum SourceEvent {
    /// One mono block of normalized samples
    Block(Vec<f32>),
    /// The source stopped working and will not recover
    Failed(String),
}

pub type BlockSender = mpsc::Sender<SourceEvent>;
pub type BlockReceiver = mpsc::Receiver<SourceEvent>;

/// Create the bounded queue between a source and the tick loop
pub fn block_queue() -> (BlockSender, BlockReceiver) {
    mpsc::channel(crate::constants::audio::QUEUE_CAPACITY)
}

/// Latest terminal failure reported by a running source
pub type FailureWatch = watch::Receiver<Option<String>>;

/// Records a terminal source failure outside the block queue, so a full
/// queue can never swallow it
pub struct FailureNotifier {
    tx: watch::Sender<Option<String>>,
}

impl FailureNotifier {
    pub fn notify(&self, reason: String) {
        self.tx.send_replace(Some(reason));
    }
}

/// Pair a failure notifier (producer side) with the watch the handle keeps
pub fn failure_channel() -> (FailureNotifier, FailureWatch) {
    let (tx, rx) = watch::channel(None);
    (FailureNotifier { tx }, rx)
}

/// Audio configuration and device information
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Something that can feed sample blocks to the meter
pub trait AudioSource {
    fn info(&self) -> &SourceInfo;

    /// Start delivering blocks of `block_len` mono samples into `queue`.
    ///
    /// Delivery stops when the returned handle is stopped or dropped.
    fn start(&mut self, queue: BlockSender, block_len: usize) -> MeterResult<SourceHandle>;
}

enum Running {
    Stream(cpal::Stream),
    Worker {
        thread: Option<JoinHandle<()>>,
        stop: Arc<AtomicBool>,
    },
}

/// Keeps a started source alive and releases it on stop or drop
pub struct SourceHandle {
    running: Running,
    dropped: Arc<AtomicUsize>,
    failure: FailureWatch,
}

impl SourceHandle {
    fn stream(stream: cpal::Stream, dropped: Arc<AtomicUsize>, failure: FailureWatch) -> Self {
        Self {
            running: Running::Stream(stream),
            dropped,
            failure,
        }
    }

    /// Worker thread that never reports failures
    pub(crate) fn worker(thread: JoinHandle<()>, stop: Arc<AtomicBool>) -> Self {
        let (_, failure) = failure_channel();
        Self::watched_worker(thread, stop, failure)
    }

    pub(crate) fn watched_worker(
        thread: JoinHandle<()>,
        stop: Arc<AtomicBool>,
        failure: FailureWatch,
    ) -> Self {
        Self {
            running: Running::Worker {
                thread: Some(thread),
                stop,
            },
            dropped: Arc::new(AtomicUsize::new(0)),
            failure,
        }
    }

    /// Blocks discarded because the queue was full
    pub fn dropped_blocks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Terminal failure reported so far, if any
    pub fn failure(&self) -> Option<String> {
        self.failure.borrow().clone()
    }

    /// Resolves once the source reports a terminal failure; pends forever
    /// for sources that can no longer report one
    pub async fn failed(&mut self) -> String {
        loop {
            if let Some(reason) = self.failure.borrow_and_update().clone() {
                return reason;
            }
            if self.failure.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Stop delivery and release the underlying audio handle
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        match &mut self.running {
            Running::Stream(stream) => {
                if let Err(err) = stream.pause() {
                    tracing::debug!(%err, "failed to pause input stream");
                }
            }
            Running::Worker { thread, stop } => {
                stop.store(true, Ordering::Relaxed);
                if let Some(thread) = thread.take()
                    && thread.join().is_err()
                {
                    tracing::warn!("audio worker thread panicked");
                }
            }
        }
    }
}

/// Collects callback-sized chunks into fixed-size mono blocks for the queue
pub struct BlockAccumulator {
    block_len: usize,
    channels: usize,
    pending: Vec<f32>,
    sender: BlockSender,
    dropped: Arc<AtomicUsize>,
}

impl BlockAccumulator {
    pub fn new(
        block_len: usize,
        channels: usize,
        sender: BlockSender,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        let block_len = block_len.max(1);
        Self {
            block_len,
            channels: channels.max(1),
            pending: Vec::with_capacity(block_len * 2),
            sender,
            dropped,
        }
    }

    /// Append interleaved samples and send every completed block
    pub fn push<T: Sample>(&mut self, data: &[T]) {
        append_downmixed(&mut self.pending, data, self.channels);

        while self.pending.len() >= self.block_len {
            let rest = self.pending.split_off(self.block_len);
            let block = std::mem::replace(&mut self.pending, rest);
            match self.sender.try_send(SourceEvent::Block(block)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Closed(_)) => {
                    self.pending.clear();
                    return;
                }
            }
        }
    }
}

/// Sort cpal stream errors into terminal failures and recoverable noise.
///
/// Only a vanished device ends the session; backend errors such as ALSA
/// xruns are logged and capture carries on.
pub(crate) fn report_stream_error(err: cpal::StreamError, failures: &FailureNotifier) {
    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
        tracing::error!(%err, "input device lost");
        failures.notify(err.to_string());
    } else {
        tracing::warn!(%err, "input stream reported a recoverable error");
    }
}

/// List input device names so the CLI can offer a selector
pub fn list_input_devices() -> MeterResult<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Microphone or line input captured through cpal
pub struct MicrophoneSource {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    info: SourceInfo,
}

impl MicrophoneSource {
    /// Find the named input device, or the default one
    pub fn open(device_name: Option<&str>) -> MeterResult<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            host.input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| {
                    MeterError::unavailable(format!("Input device '{}' not found", name))
                })?
        } else {
            host.default_input_device()
                .ok_or_else(|| MeterError::unavailable("No default input device available"))?
        };

        let name = device.name()?;
        let config = device.default_input_config()?;

        let info = SourceInfo {
            name,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };

        tracing::info!(
            device = %info.name,
            sample_rate = info.sample_rate,
            channels = info.channels,
            format = ?config.sample_format(),
            "opened input device"
        );

        Ok(Self { device, config, info })
    }

    fn build_stream<T>(
        &self,
        config: &cpal::StreamConfig,
        mut accumulator: BlockAccumulator,
        failures: FailureNotifier,
    ) -> MeterResult<cpal::Stream>
    where
        T: Sample + cpal::SizedSample + Send + 'static,
    {
        let stream = self.device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| accumulator.push(data),
            move |err| report_stream_error(err, &failures),
            None,
        )?;
        Ok(stream)
    }
}

impl AudioSource for MicrophoneSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn start(&mut self, queue: BlockSender, block_len: usize) -> MeterResult<SourceHandle> {
        let stream_config = cpal::StreamConfig {
            channels: self.info.channels,
            sample_rate: cpal::SampleRate(self.info.sample_rate),
            buffer_size: crate::constants::audio::BUFFER_SIZE,
        };

        let dropped = Arc::new(AtomicUsize::new(0));
        let channels = self.info.channels as usize;
        let accumulator = BlockAccumulator::new(block_len, channels, queue, dropped.clone());
        let (notifier, failure) = failure_channel();

        let stream = match self.config.sample_format() {
            SampleFormat::F32 => self.build_stream::<f32>(&stream_config, accumulator, notifier)?,
            SampleFormat::F64 => self.build_stream::<f64>(&stream_config, accumulator, notifier)?,
            SampleFormat::I16 => self.build_stream::<i16>(&stream_config, accumulator, notifier)?,
            SampleFormat::I32 => self.build_stream::<i32>(&stream_config, accumulator, notifier)?,
            SampleFormat::U8 => self.build_stream::<u8>(&stream_config, accumulator, notifier)?,
            SampleFormat::U16 => self.build_stream::<u16>(&stream_config, accumulator, notifier)?,
            other => {
                return Err(MeterError::unavailable(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        stream.play()?;
        tracing::info!(block_len, "input stream started");

        Ok(SourceHandle::stream(stream, dropped, failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator(
        block_len: usize,
        channels: usize,
        capacity: usize,
    ) -> (BlockAccumulator, BlockReceiver, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(capacity);
        let dropped = Arc::new(AtomicUsize::new(0));
        (BlockAccumulator::new(block_len, channels, tx, dropped.clone()), rx, dropped)
    }

    fn expect_block(rx: &mut BlockReceiver) -> Vec<f32> {
        match rx.try_recv() {
            Ok(SourceEvent::Block(block)) => block,
            other => panic!("expected a block, got {:?}", other),
        }
    }

    #[test]
    fn emits_fixed_size_blocks() {
        let (mut acc, mut rx, _) = accumulator(4, 1, 8);
        acc.push(&[0.1f32, 0.2, 0.3]);
        assert!(rx.try_recv().is_err());

        acc.push(&[0.4f32, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(expect_block(&mut rx), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(expect_block(&mut rx), vec![0.5, 0.6, 0.7, 0.8]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn downmixes_before_blocking() {
        let (mut acc, mut rx, _) = accumulator(2, 2, 8);
        acc.push(&[16_384i16, 16_384, -16_384, 0]);
        assert_eq!(expect_block(&mut rx), vec![0.5, -0.25]);
    }

    #[test]
    fn counts_blocks_dropped_on_full_queue() {
        let (mut acc, mut rx, dropped) = accumulator(1, 1, 2);
        acc.push(&[0.1f32, 0.2, 0.3, 0.4]);
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(expect_block(&mut rx), vec![0.1]);
        assert_eq!(expect_block(&mut rx), vec![0.2]);
    }

    #[test]
    fn closed_queue_discards_pending() {
        let (mut acc, rx, dropped) = accumulator(2, 1, 4);
        drop(rx);
        acc.push(&[0.1f32, 0.2, 0.3]);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
        assert!(acc.pending.is_empty());
    }

    #[test]
    fn worker_handle_joins_on_drop() {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        });
        let handle = SourceHandle::worker(thread, stop.clone());
        handle.stop();
        assert!(stop.load(Ordering::Relaxed));
    }

    fn idle_handle(failure: FailureWatch) -> SourceHandle {
        let stop = Arc::new(AtomicBool::new(false));
        SourceHandle::watched_worker(std::thread::spawn(|| {}), stop, failure)
    }

    #[test]
    fn lost_device_is_recorded_even_with_full_queue() {
        let (mut acc, _rx, dropped) = accumulator(1, 1, 1);
        acc.push(&[0.1f32, 0.2, 0.3]);
        assert_eq!(dropped.load(Ordering::Relaxed), 2);

        let (notifier, failure) = failure_channel();
        let handle = idle_handle(failure);
        assert_eq!(handle.failure(), None);

        report_stream_error(cpal::StreamError::DeviceNotAvailable, &notifier);
        let reason = handle.failure().unwrap();
        assert_eq!(reason, cpal::StreamError::DeviceNotAvailable.to_string());
    }

    #[test]
    fn backend_errors_are_not_terminal() {
        let (notifier, failure) = failure_channel();
        let handle = idle_handle(failure);
        let err = cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "alsa::poll() returned POLLERR".to_string(),
            },
        };
        report_stream_error(err, &notifier);
        assert_eq!(handle.failure(), None);
    }

    #[tokio::test]
    async fn failed_resolves_after_notify() {
        let (notifier, failure) = failure_channel();
        let mut handle = idle_handle(failure);
        notifier.notify("device unplugged".to_string());
        assert_eq!(handle.failed().await, "device unplugged");
    }
}
