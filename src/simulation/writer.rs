//! BatchWriter — streams readings into the store in fixed-size batches.
//!
//! Each batch is one transaction. A failing batch rolls back alone; every
//! batch committed before it stays committed. Cancellation is checked
//! between batches, never inside one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use super::error::SimulationError;
use super::traits::ReadingStore;
use super::types::ProgressEvent;
use crate::models::Reading;

/// What a completed write pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub written: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

pub struct BatchWriter<'a> {
    store: &'a dyn ReadingStore,
    batch_size: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn ReadingStore, batch_size: usize) -> Self {
        Self { store, batch_size: batch_size.max(1), cancel: None }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Drain `readings` into the store.
    ///
    /// `observe` sees every batch after it commits. `progress` receives a
    /// `BatchCommitted` event per batch.
    pub fn write<I>(
        &self,
        conn: &Connection,
        readings: I,
        observe: &mut dyn FnMut(&[Reading]),
        progress: Option<&dyn Fn(ProgressEvent)>,
    ) -> Result<WriteOutcome, SimulationError>
    where
        I: IntoIterator<Item = Reading>,
    {
        let start = Instant::now();
        let mut readings = readings.into_iter();
        let mut buffer: Vec<Reading> = Vec::with_capacity(self.batch_size);
        let mut total_written = 0usize;
        let mut batch_index = 0usize;

        loop {
            if self.cancelled() {
                tracing::warn!(committed = total_written, "Run cancelled between batches");
                return Err(SimulationError::Cancelled { committed: total_written });
            }

            buffer.clear();
            buffer.extend(readings.by_ref().take(self.batch_size));
            if buffer.is_empty() {
                break;
            }

            let written = self.store.insert_batch(conn, &buffer).map_err(|source| {
                tracing::error!(
                    batch = batch_index,
                    offset = total_written,
                    error = %source,
                    "Batch rolled back"
                );
                SimulationError::Persistence { batch_index, offset: total_written, source }
            })?;

            observe(&buffer);
            total_written += written;

            let elapsed = start.elapsed();
            let rate = readings_per_second(total_written, elapsed);
            tracing::info!(
                batch = batch_index,
                written,
                total = total_written,
                elapsed_ms = elapsed.as_millis() as u64,
                rate = format!("{rate:.0}/s"),
                "Batch committed"
            );
            if let Some(progress) = progress {
                progress(ProgressEvent::BatchCommitted {
                    batch_index,
                    written,
                    total_written,
                    elapsed_ms: elapsed.as_millis() as u64,
                    readings_per_second: rate,
                });
            }

            batch_index += 1;
        }

        Ok(WriteOutcome {
            written: total_written,
            batches: batch_index,
            elapsed: start.elapsed(),
        })
    }
}

pub fn readings_per_second(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}
