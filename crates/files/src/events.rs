//! Transfer progress events.

use std::fmt::Display;

use cirrus_transfer::ProgressSnapshot;
use tokio::sync::mpsc;
use tracing::trace;

/// Event emitted while a transfer runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Transfer started. `parts` is the part count for multipart uploads,
    /// the block count for downloads and 1 for single-shot uploads.
    Started {
        name: String,
        total_bytes: u64,
        parts: u32,
    },
    /// A part or block finished.
    Progress {
        name: String,
        snapshot: ProgressSnapshot,
    },
    /// Transfer finished successfully.
    Completed { name: String },
    /// Transfer failed.
    Failed { name: String, error: String },
}

/// Optional event channel tagged with the name of the transfer.
///
/// Lifecycle events wait for channel capacity. Progress events are dropped
/// when the channel is full so a slow consumer never stalls part workers.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<TransferEvent>>,
    name: String,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<TransferEvent>) -> Self {
        Self {
            tx: Some(tx),
            name: String::new(),
        }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Same channel, tagged with `name`.
    pub fn named(&self, name: impl Into<String>) -> Self {
        Self {
            tx: self.tx.clone(),
            name: name.into(),
        }
    }

    pub async fn started(&self, total_bytes: u64, parts: u32) {
        self.emit(TransferEvent::Started {
            name: self.name.clone(),
            total_bytes,
            parts,
        })
        .await;
    }

    pub fn progress(&self, snapshot: ProgressSnapshot) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx
            .try_send(TransferEvent::Progress {
                name: self.name.clone(),
                snapshot,
            })
            .is_err()
        {
            trace!(name = %self.name, "progress event dropped");
        }
    }

    pub async fn completed(&self) {
        self.emit(TransferEvent::Completed {
            name: self.name.clone(),
        })
        .await;
    }

    pub async fn failed(&self, error: &impl Display) {
        self.emit(TransferEvent::Failed {
            name: self.name.clone(),
            error: error.to_string(),
        })
        .await;
    }

    async fn emit(&self, event: TransferEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
