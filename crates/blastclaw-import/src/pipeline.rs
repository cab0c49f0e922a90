//! Two-pass dedup admission pipeline.
//!
//! Pass 1 indexes the batch by normalized phone and flags every member of
//! an in-file duplicate group. Pass 2 walks the batch in original order
//! and classifies each record against the already-persisted phone set.
//! Aggregate counters are always recomputed from current membership —
//! never maintained incrementally, so they cannot drift.

use std::collections::{HashMap, HashSet};

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::traits::ContactWriter;
use blastclaw_core::types::{
    normalize_phone, Classification, ImportFailure, ImportOutcome, ImportRecord, ImportReport,
    NewContact, RawContact,
};

/// Records committed to the contact store per progress report.
pub const COMMIT_CHUNK_SIZE: usize = 25;

const SKIP_REASON_USER: &str = "user";
const SKIP_REASON_DUPLICATE: &str = "duplicate-in-file";

/// Aggregate counters over an import batch, derived from membership.
///
/// `valid` counts the records admitted for commit (plain valid records
/// plus in-file duplicates that are still selected); `duplicate_in_file`
/// counts in-file duplicates the user has skipped. The four category
/// fields always sum to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounts {
    pub valid: usize,
    pub duplicate_in_file: usize,
    pub duplicate_existing: usize,
    pub missing: usize,
    pub total: usize,
}

/// A classified import batch, ready for user resolution and commit.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    records: Vec<ImportRecord>,
}

impl ImportBatch {
    /// Classify `raw` against the set of already-persisted normalized
    /// phone numbers.
    pub fn classify(raw: Vec<RawContact>, existing: &HashSet<String>) -> Self {
        let normalized: Vec<String> = raw
            .iter()
            .map(|r| normalize_phone(&r.phone_number))
            .collect();

        // Pass 1: first-seen index per phone; every later sighting flags
        // both ends of the pair.
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let mut in_file_dup: HashSet<usize> = HashSet::new();
        for (i, phone) in normalized.iter().enumerate() {
            if phone.is_empty() {
                continue;
            }
            match first_seen.get(phone.as_str()) {
                Some(first) => {
                    in_file_dup.insert(*first);
                    in_file_dup.insert(i);
                }
                None => {
                    first_seen.insert(phone.as_str(), i);
                }
            }
        }

        // Pass 2: classify in original order. Valid records extend a
        // working copy of the existing set so later records cannot slip
        // past the same phone twice.
        let mut working: HashSet<String> = existing.clone();
        let mut records = Vec::with_capacity(raw.len());
        for (i, record) in raw.into_iter().enumerate() {
            let phone = normalized[i].clone();
            let classification = if phone.is_empty() {
                Classification::Missing
            } else if existing.contains(&phone) {
                Classification::DuplicateExisting
            } else if in_file_dup.contains(&i) {
                Classification::DuplicateInFile
            } else if working.contains(&phone) {
                Classification::DuplicateExisting
            } else {
                working.insert(phone.clone());
                Classification::Valid
            };

            let selected = matches!(
                classification,
                Classification::Valid | Classification::DuplicateInFile
            );
            records.push(ImportRecord {
                raw: record,
                normalized_phone: phone,
                classification,
                selected,
                skip_reason: None,
            });
        }

        tracing::debug!(
            "Classified import batch: {} record(s), {} in-file duplicate(s)",
            records.len(),
            in_file_dup.len()
        );
        Self { records }
    }

    /// Rebuild a batch from records that round-tripped through a client
    /// (gateway classify → resolve → commit flow).
    pub fn from_records(records: Vec<ImportRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ImportRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recompute the aggregate counters from current membership.
    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts {
            valid: 0,
            duplicate_in_file: 0,
            duplicate_existing: 0,
            missing: 0,
            total: self.records.len(),
        };
        for record in &self.records {
            match record.classification {
                Classification::Valid => counts.valid += 1,
                Classification::DuplicateInFile => {
                    if record.selected {
                        counts.valid += 1;
                    } else {
                        counts.duplicate_in_file += 1;
                    }
                }
                Classification::DuplicateExisting => counts.duplicate_existing += 1,
                Classification::Missing => counts.missing += 1,
                // Never stored as an admission result.
                Classification::Skipped => {}
            }
        }
        counts
    }

    /// Toggle one record between the commit set and skipped. Only records
    /// admitted as valid or in-file duplicate can be moved; idempotent.
    pub fn set_skipped(&mut self, index: usize, skipped: bool) -> Result<()> {
        let record = self
            .records
            .get_mut(index)
            .ok_or_else(|| BlastClawError::NotFound(format!("import record {index}")))?;
        if !matches!(
            record.classification,
            Classification::Valid | Classification::DuplicateInFile
        ) {
            return Err(BlastClawError::Conflict(format!(
                "record {index} is {:?} and cannot be toggled",
                record.classification
            )));
        }
        record.selected = !skipped;
        record.skip_reason = skipped.then(|| SKIP_REASON_USER.to_string());
        Ok(())
    }

    /// Skip every in-file duplicate.
    pub fn skip_in_file_duplicates(&mut self) {
        for record in &mut self.records {
            if record.classification == Classification::DuplicateInFile {
                record.selected = false;
                record.skip_reason = Some(SKIP_REASON_DUPLICATE.to_string());
            }
        }
    }

    /// Skip every record currently in the commit set.
    pub fn skip_valid(&mut self) {
        for record in &mut self.records {
            if record.committable() {
                record.selected = false;
                record.skip_reason = Some(SKIP_REASON_USER.to_string());
            }
        }
    }

    /// Restore every skipped record back into the commit set.
    pub fn restore_skipped(&mut self) {
        for record in &mut self.records {
            if matches!(
                record.classification,
                Classification::Valid | Classification::DuplicateInFile
            ) && !record.selected
            {
                record.selected = true;
                record.skip_reason = None;
            }
        }
    }

    /// Commit the selected records through `writer`, in chunks of
    /// [`COMMIT_CHUNK_SIZE`]. A duplicate-phone conflict (e.g. a race
    /// with a concurrent insert) counts as a duplicate, any other failure
    /// as an error with its reason kept; the batch always runs to the
    /// end. `progress` is called after every chunk with the running
    /// totals.
    pub async fn commit(
        &self,
        writer: &dyn ContactWriter,
        mut progress: impl FnMut(ImportOutcome),
    ) -> Result<ImportReport> {
        let commit_set: Vec<&ImportRecord> =
            self.records.iter().filter(|r| r.committable()).collect();

        let mut outcome = ImportOutcome {
            total: commit_set.len(),
            ..Default::default()
        };
        let mut failures = Vec::new();

        for chunk in commit_set.chunks(COMMIT_CHUNK_SIZE) {
            for record in chunk {
                let contact = NewContact {
                    phone_number: record.normalized_phone.clone(),
                    name: record.raw.name.clone(),
                    surname: record.raw.surname.clone(),
                    email: record.raw.email.clone(),
                    birthday: record.raw.birthday.clone(),
                    source: "import".into(),
                    notes: record.raw.notes.clone(),
                };
                match writer.create_contact(contact).await {
                    Ok(_) => outcome.imported += 1,
                    Err(e) if e.is_duplicate_phone() => outcome.duplicates += 1,
                    Err(e) => {
                        outcome.errors += 1;
                        failures.push(ImportFailure {
                            phone_number: record.normalized_phone.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            progress(outcome);
        }

        tracing::info!(
            "Import committed: {} imported, {} duplicates, {} errors ({} total)",
            outcome.imported,
            outcome.duplicates,
            outcome.errors,
            outcome.total
        );
        Ok(ImportReport { outcome, failures })
    }
}
