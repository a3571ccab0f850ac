//! # Flush Coordination
//!
//! Writes and deletes fan out to both handles with fixed ordering:
//!
//! | Cycle | Order | On failure |
//! |-------|-------|------------|
//! | writes | secondary, then primary | propagate (either side) |
//! | deletes | primary, then secondary | primary propagates; secondary is logged and dropped |
//!
//! Writes are fail-fast: a file missing from a store the caller believes holds
//! it is a correctness bug. A failed remote delete only leaves an orphaned
//! object behind, so it never blocks destroying the record.
//!
//! Every cycle leaves the pending sets empty, whatever happened.

use super::{Attachment, Owner};
use crate::error::{Result, TwinError};
use crate::handle::release_sources;
use crate::model::{PendingWrite, PendingWrites};
use tracing::{debug, info, warn};

/// Outcome of a delete cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub primary_deleted: usize,
    pub secondary_deleted: usize,
    /// The suppressed alternate-store error, if its delete failed.
    pub secondary_failure: Option<String>,
}

impl<R: Owner> Attachment<R> {
    /// Commit pending writes. Mirrors to the alternate handle first when dual
    /// mode is on; the filesystem handle flushes last and releases staged sources.
    pub fn flush_writes(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_writes);
        if pending.is_empty() {
            return Ok(());
        }
        let Some(file) = self.file.clone() else {
            release_sources(pending.values());
            return Err(TwinError::NoFile(self.name.clone()));
        };

        let snapshot: PendingWrites = pending
            .into_iter()
            .map(|(style, write)| (self.key_in(&file, &style), write))
            .collect();
        let count = snapshot.len();
        let mirroring = self.mirroring();

        match self.secondary.as_mut() {
            Some(secondary) if mirroring => {
                secondary.set_pending_writes(snapshot.clone());
                self.primary.set_pending_writes(snapshot);
                if let Err(err) = secondary.flush_writes() {
                    self.primary.discard_pending_writes();
                    return Err(err);
                }
            }
            _ => self.primary.set_pending_writes(snapshot),
        }
        self.primary.flush_writes()?;

        info!(
            attachment = %self.name,
            record = %self.record_id,
            styles = count,
            mirrored = mirroring,
            "flushed writes"
        );
        Ok(())
    }

    /// Queue every style of the current file for deletion and forget the file.
    /// In dual mode both handles get the keys.
    pub fn queue_all_for_delete(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let keys = self.keys_in(&file);

        if self.mirroring() {
            self.primary.queue_some_for_delete(keys.iter().cloned());
            if let Some(secondary) = self.secondary.as_mut() {
                secondary.queue_some_for_delete(keys.iter().cloned());
            }
        }

        let discarded = std::mem::take(&mut self.pending_writes);
        release_sources(discarded.values());
        for key in keys {
            if !self.pending_deletes.contains(&key) {
                self.pending_deletes.push(key);
            }
        }
        debug!(attachment = %self.name, record = %self.record_id, file = %file.file_name, "queued for delete");
    }

    /// Commit pending deletes: filesystem first (errors propagate), then the
    /// alternate store (errors are logged and suppressed).
    pub fn flush_deletes(&mut self) -> Result<DeleteReport> {
        let queued = std::mem::take(&mut self.pending_deletes);
        self.primary.queue_some_for_delete(queued);

        let primary_deleted = match self.primary.flush_deletes() {
            Ok(count) => count,
            Err(err) => {
                if let Some(secondary) = self.secondary.as_mut() {
                    secondary.discard_pending_deletes();
                }
                return Err(err);
            }
        };

        let mut report = DeleteReport {
            primary_deleted,
            ..DeleteReport::default()
        };

        if let Some(secondary) = self.secondary.as_mut() {
            if !secondary.pending_deletes().is_empty() {
                match secondary.flush_deletes() {
                    Ok(count) => report.secondary_deleted = count,
                    Err(err) => {
                        warn!(
                            attachment = %self.name,
                            record = %self.record_id,
                            backend = %secondary.kind(),
                            error = %err,
                            "alternate storage delete failed; remote objects left behind"
                        );
                        report.secondary_failure = Some(err.to_string());
                    }
                }
            }
        }

        if report.primary_deleted > 0 || report.secondary_deleted > 0 {
            info!(
                attachment = %self.name,
                record = %self.record_id,
                primary = report.primary_deleted,
                secondary = report.secondary_deleted,
                "flushed deletes"
            );
        }
        Ok(report)
    }

    /// What the host runs when the record is saved.
    ///
    /// If the delete cycle fails, pending writes are dropped unwritten and
    /// their staged sources released; `file()` still describes the assignment
    /// that was not stored.
    pub fn save(&mut self) -> Result<()> {
        if let Err(err) = self.flush_deletes() {
            let discarded = std::mem::take(&mut self.pending_writes);
            release_sources(discarded.values());
            return Err(err);
        }
        self.flush_writes()
    }

    /// What the host runs when the record is destroyed.
    pub fn destroy(&mut self) -> Result<DeleteReport> {
        self.queue_all_for_delete();
        self.flush_deletes()
    }

    /// Copy styles stored before dual mode was switched on from the filesystem
    /// to the alternate store. Styles already mirrored, or missing locally, are
    /// skipped. Returns the number of styles copied.
    pub fn backfill_alternate(&mut self) -> Result<usize> {
        let Some(file) = self.file.clone() else {
            return Ok(0);
        };
        let Some(secondary) = self.secondary.as_ref() else {
            return Err(TwinError::SecondaryUnavailable(self.name.clone()));
        };

        let mut missing = PendingWrites::new();
        for key in self.keys_in(&file) {
            if secondary.exists(&key)? {
                continue;
            }
            match self.primary.read(&key)? {
                Some(content) => {
                    missing.insert(key, PendingWrite::new(content));
                }
                None => debug!(key = %key, "style missing locally; nothing to backfill"),
            }
        }

        if missing.is_empty() {
            return Ok(0);
        }
        let Some(secondary) = self.secondary.as_mut() else {
            return Err(TwinError::SecondaryUnavailable(self.name.clone()));
        };
        secondary.set_pending_writes(missing);
        let copied = secondary.flush_writes()?;
        info!(attachment = %self.name, record = %self.record_id, styles = copied, "backfilled alternate storage");
        Ok(copied)
    }
}
