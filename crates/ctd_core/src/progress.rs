//! Progress events for front ends.
//!
//! Workers report through a bounded channel with `try_send`. A full or
//! disconnected channel drops the event; progress never stalls a worker.

use chrono::NaiveDateTime;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::pipeline::StepFunction;

/// One progress event for a cast.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    CastStarted {
        cast: String,
    },
    /// Header fields read from the raw capture.
    HexInfo {
        cast: String,
        serial_number: String,
        cast_date: NaiveDateTime,
    },
    /// About to run a step. `index` is 1-based within the full sequence.
    ProcessStep {
        cast: String,
        step: StepFunction,
        index: usize,
        total: usize,
    },
    CastCompleted {
        cast: String,
        output: String,
    },
    CastFailed {
        cast: String,
        message: String,
    },
}

/// Non-blocking progress sender. Cloned into each worker.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// Sender that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Send an event without blocking.
    pub fn send(&self, event: ProgressEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::trace!("Progress channel full, dropping {:?}", ev);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

/// Create a bounded progress channel.
pub fn progress_channel(capacity: usize) -> (ProgressSender, Receiver<ProgressEvent>) {
    let (tx, rx) = bounded(capacity);
    (ProgressSender::new(tx), rx)
}
