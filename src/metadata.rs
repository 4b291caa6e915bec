//! Study metadata: name resolution and per-study configuration.
//!
//! The query compiler and the codecs never see names; they work on numeric
//! identifiers resolved through [`StudyMetadata`]. The trait is the boundary
//! to whatever system manages studies, samples, files and cohorts.
//! [`StudyRegistry`] is an in-memory implementation for embedded use and
//! for tests.

use crate::error::StorageError;

use std::collections::BTreeMap;

//-----------------------------------------------------------------------------

/// Declared type of an extra genotype format field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    String,
}

/// A declared extra format field of a study.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtraField {
    /// Format key as declared, e.g. `DP` or `GQ`.
    pub key: String,
    pub field_type: FieldType,
    /// Whether the per-file value lists are compressed when stored.
    pub compress: bool,
}

//-----------------------------------------------------------------------------

/// Name and id resolution plus per-study configuration.
///
/// All lookups return [`StorageError::NotFound`] for unknown names or ids.
pub trait StudyMetadata {
    /// Ids of all known studies.
    fn studies(&self) -> Vec<i32>;

    fn study_id(&self, name: &str) -> Result<i32, StorageError>;
    fn study_name(&self, id: i32) -> Result<String, StorageError>;

    fn sample_id(&self, study: i32, name: &str) -> Result<i32, StorageError>;
    fn sample_name(&self, study: i32, id: i32) -> Result<String, StorageError>;

    fn file_id(&self, study: i32, name: &str) -> Result<i32, StorageError>;
    fn file_name(&self, study: i32, id: i32) -> Result<String, StorageError>;

    fn cohort_id(&self, study: i32, name: &str) -> Result<i32, StorageError>;
    fn cohort_name(&self, study: i32, id: i32) -> Result<String, StorageError>;

    /// Genotypes not stored explicitly; the first one is the decode default.
    fn default_genotypes(&self, study: i32) -> Result<Vec<String>, StorageError>;

    /// All genotype strings that have been loaded into the study.
    fn loaded_genotypes(&self, study: i32) -> Result<Vec<String>, StorageError>;

    /// Ids of the files whose data is merged into the variant documents.
    fn indexed_files(&self, study: i32) -> Result<Vec<i32>, StorageError>;

    /// Indexed files that contain the sample.
    fn files_of_sample(&self, study: i32, sample: i32) -> Result<Vec<i32>, StorageError>;

    /// Samples of the file, in the file's column order.
    fn samples_of_file(&self, study: i32, file: i32) -> Result<Vec<i32>, StorageError>;

    /// Declared extra format fields of the study, in storage order.
    fn extra_fields(&self, study: i32) -> Result<Vec<ExtraField>, StorageError>;

    /// Release in which the sample became visible, if release tracking is on.
    fn sample_release(&self, study: i32, sample: i32) -> Result<Option<i32>, StorageError>;

    /// Release in which the file became visible, if release tracking is on.
    fn file_release(&self, study: i32, file: i32) -> Result<Option<i32>, StorageError>;
}

//-----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct StudyEntry {
    name: String,
    samples: BTreeMap<String, i32>,
    files: BTreeMap<String, i32>,
    cohorts: BTreeMap<String, i32>,
    default_genotypes: Vec<String>,
    loaded_genotypes: Vec<String>,
    indexed_files: Vec<i32>,
    file_samples: BTreeMap<i32, Vec<i32>>,
    extra_fields: Vec<ExtraField>,
    sample_releases: BTreeMap<i32, i32>,
    file_releases: BTreeMap<i32, i32>,
}

/// An in-memory [`StudyMetadata`] implementation.
///
/// Studies and their entities are registered through the `add_*` methods,
/// which assign ids in registration order. Registration methods panic if
/// the study id has not been registered first.
#[derive(Clone, Debug, Default)]
pub struct StudyRegistry {
    studies: BTreeMap<i32, StudyEntry>,
    next_study: i32,
}

impl StudyRegistry {
    pub fn new() -> Self {
        StudyRegistry { studies: BTreeMap::new(), next_study: 1 }
    }

    /// Registers a study and returns its id.
    pub fn add_study(&mut self, name: &str) -> i32 {
        let id = self.next_study;
        self.next_study += 1;
        let entry = StudyEntry {
            name: name.to_string(),
            default_genotypes: vec![String::from("0/0")],
            ..StudyEntry::default()
        };
        self.studies.insert(id, entry);
        id
    }

    fn entry_mut(&mut self, study: i32) -> &mut StudyEntry {
        self.studies.get_mut(&study).unwrap_or_else(|| panic!("Unknown study {}", study))
    }

    fn entry(&self, study: i32) -> Result<&StudyEntry, StorageError> {
        self.studies.get(&study).ok_or_else(|| StorageError::not_found("study", study.to_string()))
    }

    /// Registers a sample and returns its id.
    pub fn add_sample(&mut self, study: i32, name: &str) -> i32 {
        let entry = self.entry_mut(study);
        let id = entry.samples.len() as i32 + 1;
        entry.samples.insert(name.to_string(), id);
        id
    }

    /// Registers a file with its ordered sample ids and returns the file id.
    pub fn add_file(&mut self, study: i32, name: &str, samples: Vec<i32>) -> i32 {
        let entry = self.entry_mut(study);
        let id = entry.files.len() as i32 + 1;
        entry.files.insert(name.to_string(), id);
        entry.file_samples.insert(id, samples);
        id
    }

    /// Marks a file as indexed.
    pub fn index_file(&mut self, study: i32, file: i32) {
        let entry = self.entry_mut(study);
        if !entry.indexed_files.contains(&file) {
            entry.indexed_files.push(file);
        }
    }

    /// Registers a cohort and returns its id.
    pub fn add_cohort(&mut self, study: i32, name: &str) -> i32 {
        let entry = self.entry_mut(study);
        let id = entry.cohorts.len() as i32 + 1;
        entry.cohorts.insert(name.to_string(), id);
        id
    }

    pub fn set_default_genotypes(&mut self, study: i32, genotypes: Vec<String>) {
        self.entry_mut(study).default_genotypes = genotypes;
    }

    pub fn set_loaded_genotypes(&mut self, study: i32, genotypes: Vec<String>) {
        self.entry_mut(study).loaded_genotypes = genotypes;
    }

    pub fn set_extra_fields(&mut self, study: i32, fields: Vec<ExtraField>) {
        self.entry_mut(study).extra_fields = fields;
    }

    pub fn set_sample_release(&mut self, study: i32, sample: i32, release: i32) {
        self.entry_mut(study).sample_releases.insert(sample, release);
    }

    pub fn set_file_release(&mut self, study: i32, file: i32, release: i32) {
        self.entry_mut(study).file_releases.insert(file, release);
    }
}

impl StudyMetadata for StudyRegistry {
    fn studies(&self) -> Vec<i32> {
        self.studies.keys().copied().collect()
    }

    fn study_id(&self, name: &str) -> Result<i32, StorageError> {
        // Numeric names resolve directly.
        if let Ok(id) = name.parse::<i32>() {
            if self.studies.contains_key(&id) {
                return Ok(id);
            }
        }
        self.studies.iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| StorageError::not_found("study", name))
    }

    fn study_name(&self, id: i32) -> Result<String, StorageError> {
        Ok(self.entry(id)?.name.clone())
    }

    fn sample_id(&self, study: i32, name: &str) -> Result<i32, StorageError> {
        let entry = self.entry(study)?;
        if let Ok(id) = name.parse::<i32>() {
            if entry.samples.values().any(|v| *v == id) {
                return Ok(id);
            }
        }
        entry.samples.get(name).copied().ok_or_else(|| StorageError::not_found("sample", name))
    }

    fn sample_name(&self, study: i32, id: i32) -> Result<String, StorageError> {
        self.entry(study)?.samples.iter()
            .find(|(_, v)| **v == id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| StorageError::not_found("sample", id.to_string()))
    }

    fn file_id(&self, study: i32, name: &str) -> Result<i32, StorageError> {
        let entry = self.entry(study)?;
        if let Ok(id) = name.parse::<i32>() {
            if entry.files.values().any(|v| *v == id) {
                return Ok(id);
            }
        }
        entry.files.get(name).copied().ok_or_else(|| StorageError::not_found("file", name))
    }

    fn file_name(&self, study: i32, id: i32) -> Result<String, StorageError> {
        self.entry(study)?.files.iter()
            .find(|(_, v)| **v == id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| StorageError::not_found("file", id.to_string()))
    }

    fn cohort_id(&self, study: i32, name: &str) -> Result<i32, StorageError> {
        let entry = self.entry(study)?;
        if let Ok(id) = name.parse::<i32>() {
            if entry.cohorts.values().any(|v| *v == id) {
                return Ok(id);
            }
        }
        entry.cohorts.get(name).copied().ok_or_else(|| StorageError::not_found("cohort", name))
    }

    fn cohort_name(&self, study: i32, id: i32) -> Result<String, StorageError> {
        self.entry(study)?.cohorts.iter()
            .find(|(_, v)| **v == id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| StorageError::not_found("cohort", id.to_string()))
    }

    fn default_genotypes(&self, study: i32) -> Result<Vec<String>, StorageError> {
        Ok(self.entry(study)?.default_genotypes.clone())
    }

    fn loaded_genotypes(&self, study: i32) -> Result<Vec<String>, StorageError> {
        Ok(self.entry(study)?.loaded_genotypes.clone())
    }

    fn indexed_files(&self, study: i32) -> Result<Vec<i32>, StorageError> {
        Ok(self.entry(study)?.indexed_files.clone())
    }

    fn files_of_sample(&self, study: i32, sample: i32) -> Result<Vec<i32>, StorageError> {
        let entry = self.entry(study)?;
        let mut result = Vec::new();
        for file in &entry.indexed_files {
            if let Some(samples) = entry.file_samples.get(file) {
                if samples.contains(&sample) {
                    result.push(*file);
                }
            }
        }
        Ok(result)
    }

    fn samples_of_file(&self, study: i32, file: i32) -> Result<Vec<i32>, StorageError> {
        self.entry(study)?.file_samples.get(&file)
            .cloned()
            .ok_or_else(|| StorageError::not_found("file", file.to_string()))
    }

    fn extra_fields(&self, study: i32) -> Result<Vec<ExtraField>, StorageError> {
        Ok(self.entry(study)?.extra_fields.clone())
    }

    fn sample_release(&self, study: i32, sample: i32) -> Result<Option<i32>, StorageError> {
        Ok(self.entry(study)?.sample_releases.get(&sample).copied())
    }

    fn file_release(&self, study: i32, file: i32) -> Result<Option<i32>, StorageError> {
        Ok(self.entry(study)?.file_releases.get(&file).copied())
    }
}

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
