//! Removing files and studies, purging emptied variants, and cleaning
//! the trash.
//!
//! Removal works on the documents, not on rows: a removed file is pulled
//! out of its study entry, and a variant only leaves the main table when
//! no study has data for it anymore. Purged variants move into the trash
//! table first, so a removal can be audited before [`clean_trash`]
//! discards them.
//!
//! [`clean_trash`]: LifecycleManager::clean_trash

use crate::error::StorageError;
use crate::metadata::StudyMetadata;
use crate::predicate::Predicate;
use crate::schema;
use crate::store::{Mutation, VariantBase};

use tracing::info;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// Counts reported by a removal operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    /// Variants whose documents changed.
    pub modified: usize,
    /// Variants moved to the trash because no study data remained.
    pub purged: usize,
    /// Rows removed from the staging table.
    pub staged: usize,
}

/// Removal operations on a variant database.
pub struct LifecycleManager<'a> {
    database: &'a mut VariantBase,
    metadata: &'a dyn StudyMetadata,
}

impl<'a> LifecycleManager<'a> {
    // Tag prefix marking a study whose cohort statistics no longer match
    // the stored variants.
    const STATS_DESYNC_PREFIX: &'static str = "stats_desync_";

    pub fn new(database: &'a mut VariantBase, metadata: &'a dyn StudyMetadata) -> Self {
        LifecycleManager { database, metadata }
    }

    /// Removes the given files from a study.
    ///
    /// Removing every indexed file of the study is equivalent to removing
    /// the study itself. Otherwise the files are pulled from each study
    /// entry, samples that only appeared in the removed files leave the
    /// genotype groups, and variants left with no study data are purged.
    pub fn remove_files(&mut self, study: i32, files: &[i32]) -> Result<RemovalSummary, StorageError> {
        let indexed = self.metadata.indexed_files(study)?;
        let full_coverage = !indexed.is_empty()
            && indexed.iter().all(|file| files.contains(file));
        if full_coverage {
            return self.remove_study(study, true);
        }

        let mut staged = 0;
        for file in files {
            staged += self.database.stage_remove_file(study, *file)?;
        }

        let samples = self.exclusive_samples(study, files)?;
        let summary = self.database.update(&Predicate::True, &[], &[
            Mutation::PullFiles(study, files.to_vec()),
            Mutation::PullSamples(study, samples),
            Mutation::PruneEmptyStudies,
        ])?;
        let purged = self.purge_empty_variants()?;
        self.mark_stats_desync(study)?;

        info!(study, files = files.len(), modified = summary.modified, purged,
            "removed files");
        Ok(RemovalSummary { modified: summary.modified, purged, staged })
    }

    /// Removes every trace of a study. With `purge`, variants left with
    /// no study data move to the trash.
    pub fn remove_study(&mut self, study: i32, purge: bool) -> Result<RemovalSummary, StorageError> {
        let staged = self.database.stage_remove_study(study)?;
        let summary = self.database.update(&Predicate::True, &[], &[
            Mutation::PullStudy(study),
        ])?;
        let purged = if purge { self.purge_empty_variants()? } else { 0 };
        self.mark_stats_desync(study)?;

        info!(study, modified = summary.modified, purged, "removed study");
        Ok(RemovalSummary { modified: summary.modified, purged, staged })
    }

    /// Moves every variant with no study entries into the trash.
    /// Returns the number of moved variants.
    pub fn purge_empty_variants(&mut self) -> Result<usize, StorageError> {
        let empty = Predicate::ArrayEmpty { path: String::from(schema::STUDIES) };
        let expected = self.database.count(&empty, &[])?;
        let moved = self.database.delete_to_trash(&empty)?;
        if moved != expected {
            return Err(StorageError::Consistency {
                operation: String::from("purge"),
                expected,
                actual: moved,
            });
        }
        Ok(moved)
    }

    /// Discards trash entries deleted at or before the timestamp.
    ///
    /// When nothing newer remains, the trash table itself is dropped, so
    /// an idle database carries no leftover tables. Returns the number of
    /// discarded entries.
    pub fn clean_trash(&mut self, up_to: i64) -> Result<usize, StorageError> {
        let Some(newest) = self.database.trash_newest()? else {
            return Ok(0);
        };
        let removed = if newest <= up_to {
            let count = self.database.trash_entries()?.len();
            self.database.drop_trash()?;
            count
        } else {
            self.database.trash_delete_up_to(up_to)?
        };
        info!(removed, "cleaned trash");
        Ok(removed)
    }

    // Samples that appear in no indexed file outside the removed set.
    fn exclusive_samples(&self, study: i32, files: &[i32]) -> Result<Vec<i32>, StorageError> {
        let mut result = Vec::new();
        for file in files {
            for sample in self.metadata.samples_of_file(study, *file)? {
                if result.contains(&sample) {
                    continue;
                }
                let owners = self.metadata.files_of_sample(study, sample)?;
                if owners.iter().all(|owner| files.contains(owner)) {
                    result.push(sample);
                }
            }
        }
        Ok(result)
    }

    fn mark_stats_desync(&mut self, study: i32) -> Result<(), StorageError> {
        let key = format!("{}{}", Self::STATS_DESYNC_PREFIX, study);
        self.database.set_tag(&key, "true")
    }
}

//-----------------------------------------------------------------------------
