//
// orchestrator.rs
// dicom-veil
//
// Runs one resolved action list over a selected batch of uploaded files, strictly one file at a time.
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::codec::{Codec, CodecEngine};
use crate::error::Result;
use crate::profile::{to_codec_actions, ResolvedAction};
use crate::registry::{FileId, FileRegistry, FileStatus};

/// Shared "batch in progress" flag for whoever renders progress.
#[derive(Debug, Clone, Default)]
pub struct BusyIndicator(Arc<AtomicBool>);

impl BusyIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn hold(&self) -> BusyGuard {
        self.0.store(true, Ordering::SeqCst);
        BusyGuard(self.clone())
    }
}

// Clears the flag on every exit path, including early returns through `?`.
struct BusyGuard(BusyIndicator);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of a completed batch. Empty when the filtered selection was empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub anonymized: Vec<FileId>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.anonymized.is_empty()
    }
}

pub struct AnonymizationOrchestrator<E> {
    codec: Codec<E>,
    busy: BusyIndicator,
}

impl<E: CodecEngine> AnonymizationOrchestrator<E> {
    pub fn new(codec: Codec<E>, busy: BusyIndicator) -> Self {
        Self { codec, busy }
    }

    pub fn codec(&self) -> &Codec<E> {
        &self.codec
    }

    pub fn busy(&self) -> &BusyIndicator {
        &self.busy
    }

    /// Transforms every selected UPLOADED file in selection order.
    ///
    /// The first failing file aborts the rest of the batch; files finished before it stay
    /// ANONYMIZED. The busy indicator is set for the duration of the call.
    pub async fn run(
        &self,
        registry: &mut FileRegistry,
        selected: &[FileId],
        actions: &[ResolvedAction],
    ) -> Result<BatchReport> {
        let batch = registry.select(selected, FileStatus::Uploaded);
        if batch.is_empty() {
            debug!(selected = selected.len(), "nothing to anonymize");
            return Ok(BatchReport::default());
        }

        let _busy = self.busy.hold();
        let started = Instant::now();
        info!(files = batch.len(), actions = actions.len(), "starting anonymization batch");

        self.codec.readiness().wait().await?;
        let payload = to_codec_actions(actions);
        let mut report = BatchReport::default();

        for id in batch {
            // Skip anything that left UPLOADED since the selection was filtered.
            let Some(record) = registry.get(id).filter(|r| r.status() == FileStatus::Uploaded)
            else {
                continue;
            };

            let result = match self
                .codec
                .apply_actions(record.name(), record.source_bytes(), &payload)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        file = %record.name(),
                        done = report.anonymized.len(),
                        error = %err,
                        "anonymization batch aborted"
                    );
                    return Err(err);
                }
            };
            debug!(file = %record.name(), size = result.len(), "file anonymized");
            registry.mark_anonymized(id, result);
            report.anonymized.push(id);
        }

        info!(
            files = report.anonymized.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "anonymization batch finished"
        );
        Ok(report)
    }
}
