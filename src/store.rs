//! Variant-base: a SQLite database storing variant documents.
//!
//! Variants live in a single table keyed by their sortable storage key,
//! with the full document serialized into a blob column. Region filters
//! turn into key range scans; every other condition is evaluated against
//! the decoded document with a [`Predicate`]. Per-file rows awaiting merge
//! sit in a staging table, and deleted variants move into a lazily created
//! trash table before they are dropped for good.

use crate::document::{Document, Value};
use crate::error::StorageError;
use crate::key::VariantKey;
use crate::predicate::Predicate;
use crate::schema::{self, DocumentSchema};
use crate::utils;
use crate::variant::{TrashEntry, Variant};

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use tracing::info;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// A database connection to a variant-base database.
///
/// This structure stores a database connection and some header information.
/// In multi-threaded applications, each thread should have its own connection.
#[derive(Debug)]
pub struct VariantBase {
    connection: Connection,
    version: String,
}

/// Using the database.
impl VariantBase {
    // Key for database version.
    const KEY_VERSION: &'static str = "version";

    /// Current database version.
    pub const VERSION: &'static str = "variant-base v0.1.0";

    /// Opens a connection to the database in the given file.
    ///
    /// Checks the database version and passes through any database errors.
    pub fn open<P: AsRef<Path>>(filename: P) -> Result<Self, StorageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(filename, flags)?;

        let version: String = connection.query_row(
            "SELECT value FROM Tags WHERE key = ?1",
            (Self::KEY_VERSION,),
            |row| row.get(0),
        )?;
        if version != Self::VERSION {
            return Err(StorageError::Database(format!(
                "Unsupported database version: {} (expected {})", version, Self::VERSION
            )));
        }

        Ok(VariantBase { connection, version })
    }

    /// Creates a new database in the given file.
    ///
    /// Returns an error if the database already exists.
    /// Passes through any database errors.
    pub fn create<P: AsRef<Path>>(filename: P) -> Result<Self, StorageError> {
        if utils::file_exists(&filename) {
            return Err(StorageError::Database(format!(
                "Database {} already exists", filename.as_ref().display()
            )));
        }
        let connection = Connection::open(&filename)?;

        connection.execute(
            "CREATE TABLE Tags (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            ) STRICT",
            (),
        )?;
        connection.execute(
            "INSERT INTO Tags(key, value) VALUES (?1, ?2)",
            (Self::KEY_VERSION, Self::VERSION),
        )?;

        connection.execute(
            "CREATE TABLE Variants (
                id TEXT PRIMARY KEY,
                chromosome TEXT NOT NULL,
                start INTEGER NOT NULL,
                end INTEGER NOT NULL,
                document BLOB NOT NULL
            ) STRICT",
            (),
        )?;
        connection.execute(
            "CREATE INDEX VariantPosition ON Variants(chromosome, start)",
            (),
        )?;

        connection.execute(
            "CREATE TABLE Stage (
                id TEXT NOT NULL,
                study INTEGER NOT NULL,
                file INTEGER NOT NULL,
                document BLOB NOT NULL,
                PRIMARY KEY (id, study, file)
            ) STRICT",
            (),
        )?;

        info!(filename = %filename.as_ref().display(), "created database");
        Ok(VariantBase { connection, version: Self::VERSION.to_string() })
    }

    /// Returns the filename of the database, if there is one.
    pub fn filename(&self) -> Option<&str> {
        self.connection.path()
    }

    /// Returns the version of the database.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the value of the tag with the given key.
    pub fn get_tag(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self.connection.query_row(
            "SELECT value FROM Tags WHERE key = ?1",
            (key,),
            |row| row.get(0),
        ).optional()?;
        Ok(value)
    }

    /// Sets the value of the tag with the given key, replacing any
    /// previous value.
    pub fn set_tag(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.connection.execute(
            "INSERT OR REPLACE INTO Tags(key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        Ok(())
    }

    /// Returns the number of variants in the database.
    pub fn variant_count(&self) -> Result<usize, StorageError> {
        let count = self.connection.query_row(
            "SELECT COUNT(*) FROM Variants", (), |row| row.get(0)
        )?;
        Ok(count)
    }
}

/// Determines whether the given file is a variant-base database.
pub fn is_variant_base<P: AsRef<Path>>(filename: P) -> bool {
    if !utils::file_exists(&filename) {
        return false;
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let Ok(connection) = Connection::open_with_flags(filename, flags) else {
        return false;
    };
    let version: rusqlite::Result<String> = connection.query_row(
        "SELECT value FROM Tags WHERE key = 'version'", (), |row| row.get(0)
    );
    matches!(version, Ok(v) if v.starts_with("variant-base"))
}

//-----------------------------------------------------------------------------

/// Inserting and finding variants.
impl VariantBase {
    /// Inserts the variants, replacing any previous documents with the
    /// same keys. Returns the number of inserted variants.
    pub fn insert(&mut self, variants: &[Variant]) -> Result<usize, StorageError> {
        let codec = DocumentSchema;
        let mut inserted = 0;
        let transaction = self.connection.transaction()?;
        {
            let mut insert = transaction.prepare(
                "INSERT OR REPLACE INTO Variants(id, chromosome, start, end, document)
                VALUES (?1, ?2, ?3, ?4, ?5)"
            )?;
            for variant in variants {
                let (key, document) = codec.encode(variant);
                let blob = document.to_blob()?;
                insert.execute((
                    key.as_str(),
                    variant.chromosome.as_str(), variant.start, variant.end,
                    blob,
                ))?;
                inserted += 1;
            }
        }
        transaction.commit()?;

        info!(inserted, "inserted variants");
        Ok(inserted)
    }

    /// Returns the variants matching the predicate, in key order.
    ///
    /// Non-empty `ranges` restrict the scan to the given key ranges;
    /// they should come from the region filters of the same query.
    pub fn find(
        &self, predicate: &Predicate, ranges: &[(String, String)],
        options: &FindOptions,
    ) -> Result<Vec<Variant>, StorageError> {
        let codec = DocumentSchema;
        let mut result = Vec::new();
        self.scan(ranges, |_, document| {
            if predicate.matches(&document) {
                result.push(codec.decode(&document, &options.projection));
            }
            Ok(options.limit.map(|limit| result.len() < limit).unwrap_or(true))
        })?;
        Ok(result)
    }

    /// Returns the number of variants matching the predicate.
    pub fn count(
        &self, predicate: &Predicate, ranges: &[(String, String)],
    ) -> Result<usize, StorageError> {
        let mut count = 0;
        self.scan(ranges, |_, document| {
            if predicate.matches(&document) {
                count += 1;
            }
            Ok(true)
        })?;
        Ok(count)
    }

    // Decodes every stored document in the given key ranges (or all of them)
    // and passes it to the closure, until the closure returns `false`.
    fn scan(
        &self, ranges: &[(String, String)],
        mut action: impl FnMut(&str, Document) -> Result<bool, StorageError>,
    ) -> Result<(), StorageError> {
        if ranges.is_empty() {
            return self.scan_range(None, &mut action);
        }
        for range in ranges {
            self.scan_range(Some(range), &mut action)?;
        }
        Ok(())
    }

    fn scan_range(
        &self, range: Option<&(String, String)>,
        action: &mut impl FnMut(&str, Document) -> Result<bool, StorageError>,
    ) -> Result<(), StorageError> {
        let mut statement = match range {
            Some(_) => self.connection.prepare(
                "SELECT id, document FROM Variants WHERE id >= ?1 AND id < ?2 ORDER BY id"
            )?,
            None => self.connection.prepare(
                "SELECT id, document FROM Variants ORDER BY id"
            )?,
        };
        let mut rows = match range {
            Some((low, high)) => statement.query((low, high))?,
            None => statement.query(())?,
        };
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let document = Document::from_blob(&blob)?;
            if !action(&id, document)? {
                break;
            }
        }
        Ok(())
    }
}

/// Options for [`VariantBase::find`].
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Document sections to decode.
    pub projection: schema::Projection,
}

//-----------------------------------------------------------------------------

/// An in-place change to a stored document.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Sets the field at the dotted path.
    Set(String, Value),
    /// Removes the top-level field.
    Unset(String),
    /// Removes the study entry and its statistics.
    PullStudy(i32),
    /// Removes the listed files from the study entry.
    PullFiles(i32, Vec<i32>),
    /// Removes the listed samples from every genotype group of the
    /// study's files, dropping groups that become empty.
    PullSamples(i32, Vec<i32>),
    /// Removes study entries that have no files left, with their stats.
    PruneEmptyStudies,
}

impl Mutation {
    /// Applies the mutation. Returns `true` if the document changed.
    fn apply(&self, document: &mut Document) -> bool {
        match self {
            Mutation::Set(path, value) => {
                if document.get_path(path) == Some(value) {
                    return false;
                }
                document.set_path(path, value.clone());
                true
            }
            Mutation::Unset(field) => document.remove(field).is_some(),
            Mutation::PullStudy(study) => {
                let study = *study as i64;
                let mut changed = remove_elements(document, schema::STUDIES, |entry| {
                    entry.get_int(schema::STUDY_ID) == Some(study)
                });
                changed |= remove_elements(document, schema::STATS, |entry| {
                    entry.get_int(schema::STUDY_ID) == Some(study)
                });
                changed
            }
            Mutation::PullFiles(study, files) => {
                with_study_entry(document, *study, |entry| {
                    remove_elements(entry, schema::FILES, |file| {
                        file.get_int(schema::FILE_ID)
                            .map(|fid| files.contains(&(fid.unsigned_abs() as i32)))
                            .unwrap_or(false)
                    })
                })
            }
            Mutation::PullSamples(study, samples) => {
                with_study_entry(document, *study, |entry| {
                    let mut changed = false;
                    let Some(file_values) = entry.get_array_mut(schema::FILES) else {
                        return false;
                    };
                    for value in file_values.iter_mut() {
                        let Some(file) = value.as_document_mut() else { continue };
                        changed |= pull_from_genotypes(file, samples);
                    }
                    changed
                })
            }
            Mutation::PruneEmptyStudies => {
                let mut pruned: Vec<i64> = Vec::new();
                let mut changed = false;
                if let Some(values) = document.get_array_mut(schema::STUDIES) {
                    let before = values.len();
                    values.retain(|value| {
                        let Some(entry) = value.as_document() else { return true };
                        let empty = entry.get_array(schema::FILES)
                            .map(|f| f.is_empty())
                            .unwrap_or(true);
                        if empty {
                            if let Some(sid) = entry.get_int(schema::STUDY_ID) {
                                pruned.push(sid);
                            }
                        }
                        !empty
                    });
                    changed = values.len() != before;
                }
                // Cohort statistics of a pruned study go with it.
                changed |= remove_elements(document, schema::STATS, |entry| {
                    entry.get_int(schema::STUDY_ID)
                        .map(|sid| pruned.contains(&sid))
                        .unwrap_or(false)
                });
                changed
            }
        }
    }
}

// Removes the elements of an array field that satisfy the condition.
fn remove_elements(
    document: &mut Document, field: &str,
    condition: impl Fn(&Document) -> bool,
) -> bool {
    let Some(values) = document.get_array_mut(field) else { return false };
    let before = values.len();
    values.retain(|value| {
        value.as_document().map(|entry| !condition(entry)).unwrap_or(true)
    });
    values.len() != before
}

// Runs the action on the study entry with the given id, if present.
fn with_study_entry(
    document: &mut Document, study: i32,
    action: impl FnOnce(&mut Document) -> bool,
) -> bool {
    let study = study as i64;
    let Some(values) = document.get_array_mut(schema::STUDIES) else { return false };
    for value in values.iter_mut() {
        let Some(entry) = value.as_document_mut() else { continue };
        if entry.get_int(schema::STUDY_ID) == Some(study) {
            return action(entry);
        }
    }
    false
}

// Removes the samples from every genotype group of one file entry.
fn pull_from_genotypes(file: &mut Document, samples: &[i32]) -> bool {
    let Some(groups) = file.get_mut(schema::GENOTYPES).and_then(Value::as_document_mut) else {
        return false;
    };
    let mut changed = false;
    let genotypes: Vec<String> = groups.iter().map(|(key, _)| key.clone()).collect();
    for genotype in genotypes {
        let Some(members) = groups.get_array_mut(&genotype) else { continue };
        let before = members.len();
        members.retain(|member| {
            member.as_int()
                .map(|id| !samples.contains(&(id as i32)))
                .unwrap_or(true)
        });
        if members.len() != before {
            changed = true;
        }
        if members.is_empty() {
            groups.remove(&genotype);
        }
    }
    changed
}

/// Counts reported by [`VariantBase::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Variants matching the predicate.
    pub matched: usize,
    /// Variants whose documents changed.
    pub modified: usize,
}

/// Updating and deleting variants.
impl VariantBase {
    /// Applies the mutations to every variant matching the predicate,
    /// in one transaction.
    pub fn update(
        &mut self, predicate: &Predicate, ranges: &[(String, String)],
        mutations: &[Mutation],
    ) -> Result<UpdateSummary, StorageError> {
        let mut summary = UpdateSummary::default();
        let transaction = self.connection.transaction()?;
        {
            let matching = collect_matching(&transaction, predicate, ranges)?;
            let mut update = transaction.prepare(
                "UPDATE Variants SET document = ?2 WHERE id = ?1"
            )?;
            for (id, mut document) in matching {
                summary.matched += 1;
                let mut changed = false;
                for mutation in mutations {
                    changed |= mutation.apply(&mut document);
                }
                if changed {
                    update.execute((id, document.to_blob()?))?;
                    summary.modified += 1;
                }
            }
        }
        transaction.commit()?;

        info!(matched = summary.matched, modified = summary.modified, "updated variants");
        Ok(summary)
    }

    /// Moves every variant matching the predicate into the trash table,
    /// creating it if needed. Returns the number of moved variants.
    pub fn delete_to_trash(&mut self, predicate: &Predicate) -> Result<usize, StorageError> {
        self.ensure_trash()?;
        let deleted_at = unix_time();
        let mut moved = 0;
        let transaction = self.connection.transaction()?;
        {
            let matching = collect_matching(&transaction, predicate, &[])?;
            let mut insert = transaction.prepare(
                "INSERT OR REPLACE INTO Trash(id, deleted_at, document) VALUES (?1, ?2, ?3)"
            )?;
            let mut delete = transaction.prepare(
                "DELETE FROM Variants WHERE id = ?1"
            )?;
            for (id, document) in matching {
                insert.execute((id.as_str(), deleted_at, document.to_blob()?))?;
                delete.execute((id.as_str(),))?;
                moved += 1;
            }
        }
        transaction.commit()?;

        info!(moved, "moved variants to the trash");
        Ok(moved)
    }
}

// Collects the rows matching the predicate. The connection may be a
// transaction; the rows are buffered so the caller can reuse it.
fn collect_matching(
    connection: &Connection, predicate: &Predicate, ranges: &[(String, String)],
) -> Result<Vec<(String, Document)>, StorageError> {
    let mut matching = Vec::new();
    let mut collect = |statement: &mut rusqlite::Statement,
                       params: &[&dyn rusqlite::ToSql]| -> Result<(), StorageError> {
        let mut rows = statement.query(params)?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let document = Document::from_blob(&blob)?;
            if predicate.matches(&document) {
                matching.push((id, document));
            }
        }
        Ok(())
    };
    if ranges.is_empty() {
        let mut statement = connection.prepare(
            "SELECT id, document FROM Variants ORDER BY id"
        )?;
        collect(&mut statement, rusqlite::params![])?;
    } else {
        let mut statement = connection.prepare(
            "SELECT id, document FROM Variants WHERE id >= ?1 AND id < ?2 ORDER BY id"
        )?;
        for (low, high) in ranges {
            collect(&mut statement, rusqlite::params![low, high])?;
        }
    }
    Ok(matching)
}

fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

//-----------------------------------------------------------------------------

/// The staging table.
impl VariantBase {
    /// Inserts per-file documents into the staging table, replacing any
    /// previous rows for the same (variant, study, file).
    pub fn stage_insert(
        &mut self, rows: &[(VariantKey, i32, i32, Document)],
    ) -> Result<usize, StorageError> {
        let mut inserted = 0;
        let transaction = self.connection.transaction()?;
        {
            let mut insert = transaction.prepare(
                "INSERT OR REPLACE INTO Stage(id, study, file, document) VALUES (?1, ?2, ?3, ?4)"
            )?;
            for (key, study, file, document) in rows {
                insert.execute((key.as_str(), study, file, document.to_blob()?))?;
                inserted += 1;
            }
        }
        transaction.commit()?;
        Ok(inserted)
    }

    /// Removes the staged rows of one file. Returns the number of
    /// removed rows.
    pub fn stage_remove_file(&mut self, study: i32, file: i32) -> Result<usize, StorageError> {
        let removed = self.connection.execute(
            "DELETE FROM Stage WHERE study = ?1 AND file = ?2",
            (study, file),
        )?;
        Ok(removed)
    }

    /// Removes every staged row of one study. Returns the number of
    /// removed rows.
    pub fn stage_remove_study(&mut self, study: i32) -> Result<usize, StorageError> {
        let removed = self.connection.execute(
            "DELETE FROM Stage WHERE study = ?1",
            (study,),
        )?;
        Ok(removed)
    }

    /// Returns the number of staged rows.
    pub fn stage_count(&self) -> Result<usize, StorageError> {
        let count = self.connection.query_row(
            "SELECT COUNT(*) FROM Stage", (), |row| row.get(0)
        )?;
        Ok(count)
    }
}

//-----------------------------------------------------------------------------

/// The trash table.
impl VariantBase {
    fn ensure_trash(&self) -> Result<(), StorageError> {
        self.connection.execute(
            "CREATE TABLE IF NOT EXISTS Trash (
                id TEXT PRIMARY KEY,
                deleted_at INTEGER NOT NULL,
                document BLOB NOT NULL
            ) STRICT",
            (),
        )?;
        Ok(())
    }

    fn has_trash(&self) -> Result<bool, StorageError> {
        let name: Option<String> = self.connection.query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'Trash'",
            (),
            |row| row.get(0),
        ).optional()?;
        Ok(name.is_some())
    }

    /// Returns the newest deletion timestamp in the trash, or [`None`]
    /// if the trash is empty or does not exist.
    pub fn trash_newest(&self) -> Result<Option<i64>, StorageError> {
        if !self.has_trash()? {
            return Ok(None);
        }
        let newest: Option<i64> = self.connection.query_row(
            "SELECT MAX(deleted_at) FROM Trash", (), |row| row.get(0)
        )?;
        Ok(newest)
    }

    /// Returns the trash entries, newest first.
    pub fn trash_entries(&self) -> Result<Vec<TrashEntry>, StorageError> {
        if !self.has_trash()? {
            return Ok(Vec::new());
        }
        let mut statement = self.connection.prepare(
            "SELECT id, deleted_at, document FROM Trash ORDER BY deleted_at DESC, id"
        )?;
        let mut rows = statement.query(())?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let deleted_at: i64 = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            let document = Document::from_blob(&blob)?;
            result.push(TrashEntry { key: id, deleted_at, document });
        }
        Ok(result)
    }

    /// Removes the trash entries deleted at or before the timestamp.
    /// Returns the number of removed entries.
    pub fn trash_delete_up_to(&mut self, timestamp: i64) -> Result<usize, StorageError> {
        if !self.has_trash()? {
            return Ok(0);
        }
        let removed = self.connection.execute(
            "DELETE FROM Trash WHERE deleted_at <= ?1",
            (timestamp,),
        )?;
        Ok(removed)
    }

    /// Drops the trash table entirely.
    pub fn drop_trash(&mut self) -> Result<(), StorageError> {
        self.connection.execute("DROP TABLE IF EXISTS Trash", ())?;
        Ok(())
    }
}

//-----------------------------------------------------------------------------
