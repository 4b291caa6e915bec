//! # Variant-base: a genomic variant store using a SQLite database.
//!
//! This crate stores annotated genomic variants as documents in a SQLite
//! database and compiles string-based filter queries into predicates over
//! those documents. It covers the storage side of a variant warehouse:
//! sortable keys, per-sample codecs, document encoding, query compilation,
//! and removal operations. Loading pipelines and annotation sources are
//! out of scope.
//!
//! ### Basic concepts
//!
//! Variants are accessed by storage keys, which encode the position and
//! the alleles so that lexicographic key order is genome order (see
//! [`VariantKey`]). Each variant corresponds to a row in table `Variants`,
//! with the key as its primary key and the document serialized into a
//! blob column.
//!
//! A document carries the variant identity, one entry per study with
//! per-file attributes and genotype groups, cohort statistics, and
//! annotation (see [`DocumentSchema`]). Genotype groups only store the
//! samples that deviate from the study's default genotype, so a
//! biobank-scale study stays compact. Per-sample format values are
//! packed by [`sample`] and bit-level details stay out of the documents.
//!
//! Queries arrive as string filters ([`VariantQuery`]) and compile into a
//! [`Predicate`] tree through study metadata ([`QueryCompiler`]). Region
//! filters additionally become key range scans. [`VariantBase`] evaluates
//! the predicate against the decoded documents.
//!
//! [`LifecycleManager`] removes files and studies by editing the
//! documents, moves emptied variants into a trash table, and cleans the
//! trash.

pub mod document;
pub mod error;
pub mod key;
pub mod lifecycle;
pub mod metadata;
pub mod predicate;
pub mod query;
pub mod reconcile;
pub mod sample;
pub mod schema;
pub mod store;
pub mod utils;
pub mod variant;

pub use document::{Document, Value};
pub use error::StorageError;
pub use key::VariantKey;
pub use lifecycle::{LifecycleManager, RemovalSummary};
pub use metadata::{ExtraField, FieldType, StudyMetadata, StudyRegistry};
pub use predicate::{CmpOp, Predicate};
pub use query::{QueryCompiler, QueryField, Region, VariantQuery};
pub use schema::{DocumentSchema, Projection, SampleView};
pub use store::{FindOptions, Mutation, UpdateSummary, VariantBase};
pub use variant::{Variant, VariantType};
