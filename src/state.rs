//! Metering session state

use crate::audio::{AudioSource, BlockSender, SourceEvent, SourceHandle};
use crate::error::{MeterError, MeterResult};
use crate::pipeline::{LoudnessPipeline, MeterReading};

/// Whether a source is attached and ticking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// Owns the pipeline on the consumer side of the block queue
pub struct MeterSession {
    state: SessionState,
    pipeline: LoudnessPipeline,
    latest: MeterReading,
    failure: Option<String>,
}

impl MeterSession {
    pub fn new(pipeline: LoudnessPipeline) -> Self {
        let latest = pipeline.reading();
        Self {
            state: SessionState::Idle,
            pipeline,
            latest,
            failure: None,
        }
    }

    /// Start `source` and move to `Running`.
    ///
    /// A source that cannot start leaves the session `Idle` with the reason
    /// recorded; there is no retry.
    pub fn start<S: AudioSource + ?Sized>(
        &mut self,
        source: &mut S,
        queue: BlockSender,
    ) -> MeterResult<SourceHandle> {
        let block_len = self.pipeline.config().block_len(source.info().sample_rate);
        match source.start(queue, block_len) {
            Ok(handle) => {
                self.state = SessionState::Running;
                self.failure = None;
                tracing::info!(source = %source.info().name, block_len, "session running");
                Ok(handle)
            }
            Err(err) => {
                tracing::error!(%err, "source failed to start");
                self.failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Apply one queue event; returns the new reading when the meter ticked
    pub fn handle_event(&mut self, event: SourceEvent) -> Option<MeterReading> {
        if self.state == SessionState::Idle {
            return None;
        }

        match event {
            SourceEvent::Block(block) => match self.pipeline.tick(&block) {
                Ok(reading) => {
                    self.latest = reading;
                    Some(reading)
                }
                Err(err) if err.is_terminal() => {
                    self.fail(err.to_string());
                    None
                }
                Err(err) => {
                    tracing::warn!(%err, "skipped sample block");
                    None
                }
            },
            SourceEvent::Failed(reason) => {
                self.fail(MeterError::unavailable(reason).to_string());
                None
            }
        }
    }

    /// Explicit stop; the pipeline keeps its last values
    pub fn stop(&mut self) {
        if self.state == SessionState::Running {
            tracing::info!("session stopped");
        }
        self.state = SessionState::Idle;
    }

    fn fail(&mut self, message: String) {
        tracing::error!(%message, "source lost");
        self.failure = Some(message);
        self.state = SessionState::Idle;
    }

    /// Clear history and peak; a no-op while idle
    pub fn reset(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.pipeline.reset();
        self.latest = self.pipeline.reading();
        tracing::debug!("meter reset");
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reading(&self) -> MeterReading {
        self.latest
    }

    /// Why the source stopped, if it failed
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn pipeline(&self) -> &LoudnessPipeline {
        &self.pipeline
    }
}
