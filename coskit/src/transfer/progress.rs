use coskit_core::Error;
use std::sync::Arc;

/// Progress events, delivered synchronously and in the order chunks are
/// confirmed (parallel completion order is not otherwise deterministic).
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// The transfer started.
    Started {
        /// Total bytes this transfer will move.
        total: u64,
    },
    /// One more chunk was confirmed.
    Data {
        /// Bytes confirmed by this step.
        bytes: u64,
        /// Bytes confirmed so far, resumed chunks included.
        transferred: u64,
        /// Total bytes this transfer will move.
        total: u64,
    },
    /// The transfer completed and verified.
    Completed {
        /// Total bytes this transfer moved.
        total: u64,
    },
    /// The transfer failed.
    Failed(&'a Error),
}

/// Callback for transfer progress.
pub trait ProgressListener: Send + Sync {
    /// Called for every event, synchronously from the transfer's
    /// coordinating task.
    fn on_progress(&self, event: ProgressEvent<'_>);
}

/// Internal event emitter; counts confirmed bytes and forwards to the
/// optional listener.
pub(crate) struct Progress {
    listener: Option<Arc<dyn ProgressListener>>,
    transferred: u64,
    total: u64,
}

impl Progress {
    pub(crate) fn new(listener: Option<Arc<dyn ProgressListener>>, total: u64) -> Self {
        Self {
            listener,
            transferred: 0,
            total,
        }
    }

    /// Account for chunks restored from a checkpoint; no event is emitted
    /// for them, they only raise the baseline.
    pub(crate) fn resume_from(&mut self, transferred: u64) {
        self.transferred = transferred;
    }

    fn emit(&self, event: ProgressEvent<'_>) {
        if let Some(listener) = &self.listener {
            listener.on_progress(event);
        }
    }

    pub(crate) fn started(&self) {
        self.emit(ProgressEvent::Started { total: self.total });
    }

    pub(crate) fn data(&mut self, bytes: u64) {
        self.transferred += bytes;
        self.emit(ProgressEvent::Data {
            bytes,
            transferred: self.transferred,
            total: self.total,
        });
    }

    pub(crate) fn completed(&self) {
        self.emit(ProgressEvent::Completed { total: self.total });
    }

    pub(crate) fn failed(&self, error: &Error) {
        self.emit(ProgressEvent::Failed(error));
    }
}
