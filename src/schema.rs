//! Mapping between variants and stored documents.
//!
//! [`DocumentSchema`] owns the stored field layout: which field each part of
//! a [`Variant`] lands in, how attributes are escaped, and which derived
//! fields (chunk ids, annotation combination keys, the natural id string)
//! are written alongside the data. Decoding is tolerant of partial
//! documents, so projected reads yield empty collections rather than
//! errors.

use crate::document::{Document, Value};
use crate::error::StorageError;
use crate::key::{self, VariantKey};
use crate::metadata::StudyMetadata;
use crate::reconcile::{self, FileSampleData};
use crate::sample;
use crate::utils;
use crate::variant::{
    AlternateCoordinate, Annotation, Breakend, BreakendMate, BreakendOrientation,
    ConsequenceType, FileRecord, OriginalCall, PopulationFrequency, ProteinAnnotation,
    Repeat, Score, StructuralVariant, StudyRecord, Variant, VariantStats, VariantType, Xref,
};

use std::collections::BTreeMap;


//-----------------------------------------------------------------------------

// Stored field names. These are short on purpose; every document carries them.

pub const CHROMOSOME: &str = "chr";
pub const START: &str = "start";
pub const END: &str = "end";
pub const LENGTH: &str = "len";
pub const REFERENCE: &str = "ref";
pub const ALTERNATE: &str = "alt";
pub const TYPE: &str = "type";
pub const ID_STRING: &str = "var";
pub const IDS: &str = "ids";
pub const SV: &str = "sv";
pub const RELEASE: &str = "_r";
pub const AT: &str = "_at";
pub const CHUNK_IDS: &str = "chunkIds";

pub const STUDIES: &str = "studies";
pub const STUDY_ID: &str = "sid";
pub const GENOTYPES: &str = "gt";
pub const ALTERNATES: &str = "alts";
pub const FILES: &str = "files";
pub const FILE_ID: &str = "fid";
pub const ATTRIBUTES: &str = "attrs";
pub const SAMPLE_DATA: &str = "sampleData";
pub const ORIGINAL: &str = "ori";

pub const STATS: &str = "stats";
pub const COHORT_ID: &str = "cid";
pub const MAF: &str = "maf";
pub const MGF: &str = "mgf";
pub const MAF_ALLELE: &str = "mafAl";
pub const MGF_GENOTYPE: &str = "mgfGt";
pub const MISSING_ALLELES: &str = "missAl";
pub const MISSING_GENOTYPES: &str = "missGt";
pub const ALLELE_FREQ: &str = "af";
pub const GENOTYPE_FREQ: &str = "gf";

pub const ANNOTATION: &str = "annot";
pub const CUSTOM_ANNOTATION: &str = "customAnnot";
pub const CONSEQUENCE_TYPES: &str = "ct";
pub const GENE_NAME: &str = "gn";
pub const ENSEMBL_GENE: &str = "ensg";
pub const ENSEMBL_TRANSCRIPT: &str = "enst";
pub const BIOTYPE: &str = "bt";
pub const SO_ACCESSIONS: &str = "so";
pub const TRANSCRIPT_FLAGS: &str = "flags";
pub const SIFT: &str = "sift";
pub const POLYPHEN: &str = "polyphen";
pub const KEYWORDS: &str = "kw";
pub const XREFS: &str = "xrefs";
pub const POPULATION_FREQ: &str = "popFreq";
pub const CONSERVATION: &str = "consScores";
pub const FUNCTIONAL: &str = "funcScores";
pub const REPEATS: &str = "repeats";
pub const COMBINATIONS: &str = "cmb";

/// The FILTER attribute of a file.
pub const FILTER_ATTR: &str = "FILTER";
/// The QUAL attribute of a file; stored numerically when it parses.
pub const QUAL_ATTR: &str = "QUAL";
/// The source-line attribute; stored compressed.
pub const SRC_ATTR: &str = "src";

// Attribute keys cannot contain the path separator.
const ESCAPED_DOT: &str = "&#46;";

//-----------------------------------------------------------------------------

/// Which parts of a document to decode.
#[derive(Clone, Debug, Default)]
pub struct Projection {
    /// Decode only these studies; `None` decodes all.
    pub studies: Option<Vec<i32>>,
    /// Decode only these files; `None` decodes all.
    pub files: Option<Vec<i32>>,
    /// Resolve per-sample data only for these samples; `None` resolves all.
    pub samples: Option<Vec<i32>>,
    /// Skip study records entirely.
    pub exclude_studies: bool,
    /// Skip per-file data inside studies.
    pub exclude_files: bool,
    /// Skip cohort statistics.
    pub exclude_stats: bool,
    /// Skip annotation.
    pub exclude_annotation: bool,
}

impl Projection {
    pub fn everything() -> Self {
        Projection::default()
    }

    fn wants_study(&self, study_id: i32) -> bool {
        match &self.studies {
            Some(ids) => ids.contains(&study_id),
            None => true,
        }
    }

    fn wants_file(&self, file_id: i32) -> bool {
        match &self.files {
            Some(ids) => ids.contains(&file_id.abs()),
            None => true,
        }
    }
}

//-----------------------------------------------------------------------------

/// Encodes variants into documents and back.
///
/// The schema itself is stateless; per-study context (default genotypes,
/// declared extra fields) comes from [`StudyMetadata`][crate::metadata::StudyMetadata]
/// at sample resolution time.
#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentSchema;

impl DocumentSchema {
    pub fn new() -> Self {
        DocumentSchema
    }

    /// Encodes a variant into its storage key and document.
    pub fn encode(&self, variant: &Variant) -> (VariantKey, Document) {
        let key = VariantKey::of(variant);
        let mut doc = Document::new();
        doc.set(CHROMOSOME, variant.chromosome.as_str())
            .set(START, variant.start)
            .set(END, variant.end)
            .set(LENGTH, (variant.reference.len() as i64).max(variant.alternate.len() as i64))
            .set(REFERENCE, variant.reference.as_str())
            .set(ALTERNATE, variant.alternate.as_str())
            .set(ID_STRING, variant.to_id_string());
        if let Some(variant_type) = variant.variant_type {
            doc.set(TYPE, variant_type.name());
        }
        if !variant.ids.is_empty() {
            doc.set(IDS, string_array(&variant.ids));
        }
        if let Some(sv) = &variant.sv {
            if !sv.is_empty() {
                doc.set(SV, encode_sv(sv));
            }
        }
        if let Some(release) = variant.release {
            doc.set(RELEASE, release);
        }

        // Index acceleration: both chunk resolutions for the start position.
        let mut at = Document::new();
        let chunks = key::chunk_ids_at(&variant.chromosome, variant.start);
        at.set(CHUNK_IDS, chunks.iter().map(|c| Value::from(c.as_str())).collect::<Vec<_>>());
        doc.set(AT, at);

        // Always present, so that an empty array can be queried for.
        let studies: Vec<Value> = variant.studies.iter().map(encode_study).collect();
        doc.set(STUDIES, studies);
        let stats: Vec<Value> = variant.studies.iter()
            .flat_map(|s| s.stats.iter())
            .map(encode_stats)
            .collect();
        if !stats.is_empty() {
            doc.set(STATS, stats);
        }

        if !variant.annotation.is_empty() {
            // The latest generation is the primary annotation; earlier ones
            // are kept aside under their generation id.
            let current = variant.annotation.keys().next_back().cloned();
            let mut custom = Document::new();
            for (generation, annotation) in &variant.annotation {
                if Some(generation) == current.as_ref() {
                    doc.set(ANNOTATION, encode_annotation(annotation));
                } else {
                    custom.set(generation, encode_annotation(annotation));
                }
            }
            if !custom.is_empty() {
                doc.set(CUSTOM_ANNOTATION, custom);
            }
        }

        (key, doc)
    }

    /// Decodes a document into a variant, honoring the projection.
    pub fn decode(&self, document: &Document, projection: &Projection) -> Variant {
        let mut variant = Variant {
            chromosome: document.get_str(CHROMOSOME).unwrap_or("").to_string(),
            start: document.get_int(START).unwrap_or(0),
            end: document.get_int(END).unwrap_or(0),
            reference: document.get_str(REFERENCE).unwrap_or("").to_string(),
            alternate: document.get_str(ALTERNATE).unwrap_or("").to_string(),
            variant_type: document.get_str(TYPE).and_then(VariantType::parse),
            ids: decode_string_array(document.get_array(IDS)),
            sv: document.get_document(SV).map(decode_sv),
            studies: Vec::new(),
            annotation: BTreeMap::new(),
            release: document.get_int(RELEASE).map(|r| r as i32),
        };

        if !projection.exclude_studies {
            let mut stats_by_study: BTreeMap<i32, Vec<VariantStats>> = BTreeMap::new();
            if !projection.exclude_stats {
                for entry in document.get_array(STATS).unwrap_or(&[]) {
                    if let Some(doc) = entry.as_document() {
                        let stats = decode_stats(doc);
                        stats_by_study.entry(stats.study_id).or_default().push(stats);
                    }
                }
            }
            for entry in document.get_array(STUDIES).unwrap_or(&[]) {
                let Some(doc) = entry.as_document() else { continue };
                let mut study = decode_study(doc, projection);
                if !projection.wants_study(study.study_id) {
                    continue;
                }
                study.stats = stats_by_study.remove(&study.study_id).unwrap_or_default();
                variant.studies.push(study);
            }
        }

        if !projection.exclude_annotation {
            if let Some(doc) = document.get_document(ANNOTATION) {
                let annotation = decode_annotation(doc);
                variant.annotation.insert(annotation.annotation_id.clone(), annotation);
            }
            if let Some(custom) = document.get_document(CUSTOM_ANNOTATION) {
                for (generation, value) in custom.iter() {
                    if let Some(doc) = value.as_document() {
                        variant.annotation.insert(generation.clone(), decode_annotation(doc));
                    }
                }
            }
        }

        variant
    }

    /// Resolves the per-sample view of one study: genotypes and format
    /// values per sample, with secondary alternates reconciled across files.
    pub fn resolve_samples(
        &self,
        variant: &Variant,
        study_id: i32,
        metadata: &dyn StudyMetadata,
        projection: &Projection,
        returned_unknown: Option<&str>,
    ) -> Result<SampleView, StorageError> {
        let study = variant.study(study_id)
            .ok_or_else(|| StorageError::not_found("study", study_id.to_string()))?;
        let defaults = metadata.default_genotypes(study_id)?;
        let extra_fields = metadata.extra_fields(study_id)?;

        // Requested samples default to every sample of the study's files.
        let mut per_file_samples: Vec<Vec<i32>> = Vec::new();
        for file in &study.files {
            per_file_samples.push(metadata.samples_of_file(study_id, file.absolute_id())?);
        }
        let loaded: Vec<i32> = {
            let mut all: Vec<i32> = per_file_samples.iter().flatten().copied().collect();
            all.sort_unstable();
            all.dedup();
            all
        };
        let requested: Vec<i32> = match &projection.samples {
            Some(samples) => samples.clone(),
            None => loaded.clone(),
        };

        // Decode each file's genotypes for its own samples, then reconcile
        // the per-file alternate lists.
        let mut file_data: Vec<FileSampleData> = Vec::new();
        for (file, samples) in study.files.iter().zip(per_file_samples.iter()) {
            let genotypes = sample::decode_genotypes(
                samples, &file.genotypes, samples, &defaults, returned_unknown,
            );
            file_data.push(FileSampleData {
                alternates: file.secondary_alternates.clone(),
                genotypes,
            });
        }
        let secondary_alternates = if study.secondary_alternates.is_empty() {
            reconcile::reconcile(&mut file_data)
        } else {
            study.secondary_alternates.clone()
        };

        let mut view = SampleView {
            genotypes: BTreeMap::new(),
            format_values: BTreeMap::new(),
            secondary_alternates,
        };
        for sample_id in &requested {
            let genotype = file_data.iter()
                .find_map(|f| f.genotypes.get(sample_id))
                .cloned()
                .unwrap_or_else(|| sample::UNKNOWN_GENOTYPE.to_string());
            view.genotypes.insert(*sample_id, genotype);
            view.format_values.insert(*sample_id, BTreeMap::new());
        }

        // Extra format fields, file by file.
        for (file, samples) in study.files.iter().zip(per_file_samples.iter()) {
            for field in &extra_fields {
                let stored_key = field.key.to_lowercase();
                let values = match file.sample_data.get(&stored_key) {
                    Some(blob) => sample::decode_extra_field(blob, samples.len())?,
                    None => vec![sample::UNKNOWN_FIELD.to_string(); samples.len()],
                };
                for (sample_id, value) in samples.iter().zip(values) {
                    if let Some(fields) = view.format_values.get_mut(sample_id) {
                        fields.insert(field.key.clone(), value);
                    }
                }
            }
        }
        // Samples outside every file still report every declared field.
        for fields in view.format_values.values_mut() {
            for field in &extra_fields {
                fields.entry(field.key.clone())
                    .or_insert_with(|| sample::UNKNOWN_FIELD.to_string());
            }
        }

        Ok(view)
    }
}

/// The per-sample view of one study, produced by
/// [`DocumentSchema::resolve_samples`].
#[derive(Clone, Debug, PartialEq)]
pub struct SampleView {
    /// Genotype string per requested sample.
    pub genotypes: BTreeMap<i32, String>,
    /// Declared extra format fields per requested sample.
    pub format_values: BTreeMap<i32, BTreeMap<String, String>>,
    /// Secondary alternates after reconciliation.
    pub secondary_alternates: Vec<AlternateCoordinate>,
}

//-----------------------------------------------------------------------------

// Study and file records.

fn encode_study(study: &StudyRecord) -> Value {
    let mut doc = Document::new();
    doc.set(STUDY_ID, study.study_id);
    let files: Vec<Value> = study.files.iter().map(encode_file).collect();
    doc.set(FILES, files);
    if !study.secondary_alternates.is_empty() {
        doc.set(ALTERNATES, encode_alternates(&study.secondary_alternates));
    }
    Value::from(doc)
}

fn decode_study(doc: &Document, projection: &Projection) -> StudyRecord {
    let mut study = StudyRecord::new(doc.get_int(STUDY_ID).unwrap_or(0) as i32);
    if !projection.exclude_files {
        for entry in doc.get_array(FILES).unwrap_or(&[]) {
            if let Some(file_doc) = entry.as_document() {
                let file = decode_file(file_doc);
                if projection.wants_file(file.file_id) {
                    study.files.push(file);
                }
            }
        }
    }
    study.secondary_alternates = decode_alternates(doc.get_array(ALTERNATES));
    study
}

fn encode_file(file: &FileRecord) -> Value {
    let mut doc = Document::new();
    doc.set(FILE_ID, file.file_id);

    let mut genotypes = Document::new();
    for (genotype, samples) in &file.genotypes {
        let ids: Vec<Value> = samples.iter().map(|s| Value::from(*s)).collect();
        genotypes.set(genotype, ids);
    }
    doc.set(GENOTYPES, genotypes);

    if !file.attributes.is_empty() {
        let mut attrs = Document::new();
        for (attr_key, value) in &file.attributes {
            let stored_key = attr_key.replace('.', ESCAPED_DOT);
            if attr_key == SRC_ATTR {
                attrs.set(&stored_key, utils::compress(value.as_bytes()));
            } else if attr_key == QUAL_ATTR {
                match value.parse::<f64>() {
                    Ok(qual) => attrs.set(&stored_key, qual),
                    Err(_) => attrs.set(&stored_key, value.as_str()),
                };
            } else {
                attrs.set(&stored_key, value.as_str());
            }
        }
        doc.set(ATTRIBUTES, attrs);
    }

    if !file.secondary_alternates.is_empty() {
        doc.set(ALTERNATES, encode_alternates(&file.secondary_alternates));
    }
    if let Some(original) = &file.original_call {
        let mut ori = Document::new();
        ori.set("s", original.variant_id.as_str()).set("i", original.allele_index);
        doc.set(ORIGINAL, ori);
    }
    if !file.sample_data.is_empty() {
        let mut data = Document::new();
        for (field_key, blob) in &file.sample_data {
            data.set(field_key, blob.clone());
        }
        doc.set(SAMPLE_DATA, data);
    }
    Value::from(doc)
}

fn decode_file(doc: &Document) -> FileRecord {
    let mut file = FileRecord::new(doc.get_int(FILE_ID).unwrap_or(0) as i32);

    if let Some(genotypes) = doc.get_document(GENOTYPES) {
        for (genotype, samples) in genotypes.iter() {
            let ids: Vec<i32> = samples.as_array().unwrap_or(&[]).iter()
                .filter_map(|v| v.as_int())
                .map(|v| v as i32)
                .collect();
            file.genotypes.insert(genotype.clone(), ids);
        }
    }

    if let Some(attrs) = doc.get_document(ATTRIBUTES) {
        for (stored_key, value) in attrs.iter() {
            let attr_key = stored_key.replace(ESCAPED_DOT, ".");
            let decoded = match value {
                Value::Bytes(bytes) => {
                    String::from_utf8(utils::maybe_decompress(bytes)).unwrap_or_default()
                }
                Value::Double(qual) => format!("{}", qual),
                Value::Int(qual) => format!("{}", qual),
                Value::String(text) => text.clone(),
                _ => continue,
            };
            file.attributes.insert(attr_key, decoded);
        }
    }

    file.secondary_alternates = decode_alternates(doc.get_array(ALTERNATES));
    file.original_call = doc.get_document(ORIGINAL).map(|ori| OriginalCall {
        variant_id: ori.get_str("s").unwrap_or("").to_string(),
        allele_index: ori.get_int("i").unwrap_or(0) as i32,
    });
    if let Some(data) = doc.get_document(SAMPLE_DATA) {
        for (field_key, value) in data.iter() {
            if let Some(bytes) = value.as_bytes() {
                file.sample_data.insert(field_key.clone(), bytes.to_vec());
            }
        }
    }
    file
}

//-----------------------------------------------------------------------------

// Secondary alternates.

fn encode_alternates(alternates: &[AlternateCoordinate]) -> Vec<Value> {
    alternates.iter().map(|alternate| {
        let mut doc = Document::new();
        if let Some(chromosome) = &alternate.chromosome {
            doc.set(CHROMOSOME, chromosome.as_str());
        }
        if let Some(start) = alternate.start {
            doc.set(START, start);
        }
        if let Some(end) = alternate.end {
            doc.set(END, end);
        }
        if let Some(reference) = &alternate.reference {
            doc.set(REFERENCE, reference.as_str());
        }
        doc.set(ALTERNATE, alternate.alternate.as_str());
        if let Some(variant_type) = alternate.variant_type {
            doc.set(TYPE, variant_type.name());
        }
        Value::from(doc)
    }).collect()
}

fn decode_alternates(array: Option<&[Value]>) -> Vec<AlternateCoordinate> {
    array.unwrap_or(&[]).iter().filter_map(|entry| {
        let doc = entry.as_document()?;
        Some(AlternateCoordinate {
            chromosome: doc.get_str(CHROMOSOME).map(String::from),
            start: doc.get_int(START),
            end: doc.get_int(END),
            reference: doc.get_str(REFERENCE).map(String::from),
            alternate: doc.get_str(ALTERNATE).unwrap_or("").to_string(),
            variant_type: doc.get_str(TYPE).and_then(VariantType::parse),
        })
    }).collect()
}

//-----------------------------------------------------------------------------

// Structural variants.

fn encode_sv(sv: &StructuralVariant) -> Document {
    let mut doc = Document::new();
    for (field, value) in [
        ("cil", sv.ci_start_left), ("cir", sv.ci_start_right),
        ("cel", sv.ci_end_left), ("cer", sv.ci_end_right),
    ] {
        if let Some(value) = value {
            doc.set(field, value);
        }
    }
    if let Some(copy_number) = sv.copy_number {
        doc.set("cn", copy_number);
    }
    if let Some(sequence) = &sv.inserted_sequence_left {
        doc.set("lins", sequence.as_str());
    }
    if let Some(sequence) = &sv.inserted_sequence_right {
        doc.set("rins", sequence.as_str());
    }
    if let Some(breakend) = &sv.breakend {
        let mut bnd = Document::new();
        bnd.set(CHROMOSOME, breakend.mate.chromosome.as_str())
            .set("pos", breakend.mate.position)
            .set("orient", orientation_name(breakend.orientation));
        if let Some(ci) = breakend.mate.ci_left {
            bnd.set("cil", ci);
        }
        if let Some(ci) = breakend.mate.ci_right {
            bnd.set("cir", ci);
        }
        if let Some(sequence) = &breakend.inserted_sequence {
            bnd.set("ins", sequence.as_str());
        }
        doc.set("bnd", bnd);
    }
    doc
}

fn decode_sv(doc: &Document) -> StructuralVariant {
    StructuralVariant {
        ci_start_left: doc.get_int("cil"),
        ci_start_right: doc.get_int("cir"),
        ci_end_left: doc.get_int("cel"),
        ci_end_right: doc.get_int("cer"),
        copy_number: doc.get_int("cn").map(|v| v as i32),
        inserted_sequence_left: doc.get_str("lins").map(String::from),
        inserted_sequence_right: doc.get_str("rins").map(String::from),
        breakend: doc.get_document("bnd").map(|bnd| Breakend {
            mate: BreakendMate {
                chromosome: bnd.get_str(CHROMOSOME).unwrap_or("").to_string(),
                position: bnd.get_int("pos").unwrap_or(0),
                ci_left: bnd.get_int("cil"),
                ci_right: bnd.get_int("cir"),
            },
            orientation: bnd.get_str("orient")
                .and_then(parse_orientation)
                .unwrap_or(BreakendOrientation::StartStart),
            inserted_sequence: bnd.get_str("ins").map(String::from),
        }),
    }
}

fn orientation_name(orientation: BreakendOrientation) -> &'static str {
    match orientation {
        BreakendOrientation::StartStart => "SS",
        BreakendOrientation::StartEnd => "SE",
        BreakendOrientation::EndStart => "ES",
        BreakendOrientation::EndEnd => "EE",
    }
}

fn parse_orientation(value: &str) -> Option<BreakendOrientation> {
    match value {
        "SS" => Some(BreakendOrientation::StartStart),
        "SE" => Some(BreakendOrientation::StartEnd),
        "ES" => Some(BreakendOrientation::EndStart),
        "EE" => Some(BreakendOrientation::EndEnd),
        _ => None,
    }
}

//-----------------------------------------------------------------------------

// Cohort statistics.

fn encode_stats(stats: &VariantStats) -> Value {
    let mut doc = Document::new();
    doc.set(STUDY_ID, stats.study_id)
        .set(COHORT_ID, stats.cohort_id)
        .set(MAF, stats.maf)
        .set(MGF, stats.mgf)
        .set(MISSING_ALLELES, stats.missing_alleles)
        .set(MISSING_GENOTYPES, stats.missing_genotypes);
    if let Some(allele) = &stats.maf_allele {
        doc.set(MAF_ALLELE, allele.as_str());
    }
    if let Some(genotype) = &stats.mgf_genotype {
        doc.set(MGF_GENOTYPE, genotype.as_str());
    }
    if !stats.allele_freq.is_empty() {
        doc.set(ALLELE_FREQ, encode_freq(&stats.allele_freq));
    }
    if !stats.genotype_freq.is_empty() {
        doc.set(GENOTYPE_FREQ, encode_freq(&stats.genotype_freq));
    }
    Value::from(doc)
}

fn encode_freq(freq: &[(String, f64)]) -> Vec<Value> {
    freq.iter().map(|(key, value)| {
        let mut doc = Document::new();
        doc.set("k", key.as_str()).set("f", *value);
        Value::from(doc)
    }).collect()
}

fn decode_freq(array: Option<&[Value]>) -> Vec<(String, f64)> {
    array.unwrap_or(&[]).iter().filter_map(|entry| {
        let doc = entry.as_document()?;
        Some((doc.get_str("k")?.to_string(), doc.get_double("f")?))
    }).collect()
}

fn decode_stats(doc: &Document) -> VariantStats {
    VariantStats {
        study_id: doc.get_int(STUDY_ID).unwrap_or(0) as i32,
        cohort_id: doc.get_int(COHORT_ID).unwrap_or(0) as i32,
        maf: doc.get_double(MAF).unwrap_or(0.0),
        mgf: doc.get_double(MGF).unwrap_or(0.0),
        maf_allele: doc.get_str(MAF_ALLELE).map(String::from),
        mgf_genotype: doc.get_str(MGF_GENOTYPE).map(String::from),
        missing_alleles: doc.get_int(MISSING_ALLELES).unwrap_or(0),
        missing_genotypes: doc.get_int(MISSING_GENOTYPES).unwrap_or(0),
        allele_freq: decode_freq(doc.get_array(ALLELE_FREQ)),
        genotype_freq: decode_freq(doc.get_array(GENOTYPE_FREQ)),
    }
}

//-----------------------------------------------------------------------------

// Annotation.

/// The combination keys of one consequence type, used by the gene filter.
///
/// Each key joins the present parts of (gene, biotype, SO accession) with
/// `_`, with one variant per transcript flag appended. Consequence types
/// without a gene name produce no keys.
pub fn combination_keys(ct: &ConsequenceType) -> Vec<String> {
    let Some(gene) = &ct.gene_name else { return Vec::new() };
    let mut bases = Vec::new();
    let so_parts: Vec<Option<u32>> = if ct.so_accessions.is_empty() {
        vec![None]
    } else {
        ct.so_accessions.iter().map(|so| Some(*so)).collect()
    };
    for so in so_parts {
        let mut base = gene.clone();
        if let Some(biotype) = &ct.biotype {
            base.push('_');
            base.push_str(biotype);
        }
        if let Some(so) = so {
            base.push('_');
            base.push_str(&so.to_string());
        }
        bases.push(base);
    }
    let mut keys = Vec::new();
    for base in bases {
        if ct.transcript_flags.is_empty() {
            keys.push(base);
        } else {
            for flag in &ct.transcript_flags {
                keys.push(format!("{}_{}", base, flag));
            }
        }
    }
    keys
}

fn encode_score(score: &Score) -> Value {
    let mut doc = Document::new();
    doc.set("src", score.source.as_str()).set("sc", score.score);
    if let Some(description) = &score.description {
        doc.set("ds", description.as_str());
    }
    Value::from(doc)
}

fn decode_score(doc: &Document) -> Score {
    Score {
        source: doc.get_str("src").unwrap_or("").to_string(),
        score: doc.get_double("sc").unwrap_or(0.0),
        description: doc.get_str("ds").map(String::from),
    }
}

fn encode_annotation(annotation: &Annotation) -> Document {
    let mut doc = Document::new();
    doc.set("id", annotation.annotation_id.as_str());

    let mut combinations: Vec<String> = Vec::new();
    let cts: Vec<Value> = annotation.consequence_types.iter().map(|ct| {
        combinations.extend(combination_keys(ct));
        let mut ct_doc = Document::new();
        if let Some(gene) = &ct.gene_name {
            ct_doc.set(GENE_NAME, gene.as_str());
        }
        if let Some(gene) = &ct.ensembl_gene_id {
            ct_doc.set(ENSEMBL_GENE, gene.as_str());
        }
        if let Some(transcript) = &ct.ensembl_transcript_id {
            ct_doc.set(ENSEMBL_TRANSCRIPT, transcript.as_str());
        }
        if let Some(biotype) = &ct.biotype {
            ct_doc.set(BIOTYPE, biotype.as_str());
        }
        if !ct.so_accessions.is_empty() {
            let so: Vec<Value> = ct.so_accessions.iter().map(|v| Value::from(*v as i64)).collect();
            ct_doc.set(SO_ACCESSIONS, so);
        }
        if !ct.transcript_flags.is_empty() {
            ct_doc.set(TRANSCRIPT_FLAGS, string_array(&ct.transcript_flags));
        }
        if let Some(protein) = &ct.protein {
            if let Some(sift) = &protein.sift {
                ct_doc.set(SIFT, encode_score(sift));
            }
            if let Some(polyphen) = &protein.polyphen {
                ct_doc.set(POLYPHEN, encode_score(polyphen));
            }
            if !protein.keywords.is_empty() {
                ct_doc.set(KEYWORDS, string_array(&protein.keywords));
            }
        }
        Value::from(ct_doc)
    }).collect();
    if !cts.is_empty() {
        doc.set(CONSEQUENCE_TYPES, cts);
    }
    combinations.sort();
    combinations.dedup();
    if !combinations.is_empty() {
        doc.set(COMBINATIONS, combinations.iter()
            .map(|c| Value::from(c.as_str())).collect::<Vec<_>>());
    }

    if !annotation.xrefs.is_empty() {
        let xrefs: Vec<Value> = annotation.xrefs.iter().map(|xref| {
            let mut xref_doc = Document::new();
            xref_doc.set("id", xref.id.as_str()).set("src", xref.source.as_str());
            Value::from(xref_doc)
        }).collect();
        doc.set(XREFS, xrefs);
    }
    if !annotation.population_frequencies.is_empty() {
        let freqs: Vec<Value> = annotation.population_frequencies.iter().map(|freq| {
            let mut freq_doc = Document::new();
            freq_doc.set("st", freq.study.as_str())
                .set("pop", freq.population.as_str())
                .set("refF", freq.ref_freq)
                .set("altF", freq.alt_freq);
            Value::from(freq_doc)
        }).collect();
        doc.set(POPULATION_FREQ, freqs);
    }
    if !annotation.conservation_scores.is_empty() {
        doc.set(CONSERVATION, annotation.conservation_scores.iter()
            .map(encode_score).collect::<Vec<_>>());
    }
    if !annotation.functional_scores.is_empty() {
        doc.set(FUNCTIONAL, annotation.functional_scores.iter()
            .map(encode_score).collect::<Vec<_>>());
    }
    if !annotation.repeats.is_empty() {
        let repeats: Vec<Value> = annotation.repeats.iter().map(|repeat| {
            let mut repeat_doc = Document::new();
            repeat_doc.set("id", repeat.id.as_str()).set("src", repeat.source.as_str());
            Value::from(repeat_doc)
        }).collect();
        doc.set(REPEATS, repeats);
    }
    if !annotation.extra.is_empty() {
        let mut extra = Document::new();
        for (extra_key, value) in &annotation.extra {
            extra.set(extra_key, value.as_str());
        }
        doc.set("extra", extra);
    }
    doc
}

fn decode_annotation(doc: &Document) -> Annotation {
    let mut annotation = Annotation {
        annotation_id: doc.get_str("id").unwrap_or("").to_string(),
        ..Annotation::default()
    };
    for entry in doc.get_array(CONSEQUENCE_TYPES).unwrap_or(&[]) {
        let Some(ct_doc) = entry.as_document() else { continue };
        let protein = {
            let sift = ct_doc.get_document(SIFT).map(decode_score);
            let polyphen = ct_doc.get_document(POLYPHEN).map(decode_score);
            let keywords = decode_string_array(ct_doc.get_array(KEYWORDS));
            if sift.is_some() || polyphen.is_some() || !keywords.is_empty() {
                Some(ProteinAnnotation { sift, polyphen, keywords })
            } else {
                None
            }
        };
        annotation.consequence_types.push(ConsequenceType {
            gene_name: ct_doc.get_str(GENE_NAME).map(String::from),
            ensembl_gene_id: ct_doc.get_str(ENSEMBL_GENE).map(String::from),
            ensembl_transcript_id: ct_doc.get_str(ENSEMBL_TRANSCRIPT).map(String::from),
            biotype: ct_doc.get_str(BIOTYPE).map(String::from),
            so_accessions: ct_doc.get_array(SO_ACCESSIONS).unwrap_or(&[]).iter()
                .filter_map(|v| v.as_int())
                .map(|v| v as u32)
                .collect(),
            transcript_flags: decode_string_array(ct_doc.get_array(TRANSCRIPT_FLAGS)),
            protein,
        });
    }
    for entry in doc.get_array(XREFS).unwrap_or(&[]) {
        if let Some(xref_doc) = entry.as_document() {
            annotation.xrefs.push(Xref {
                id: xref_doc.get_str("id").unwrap_or("").to_string(),
                source: xref_doc.get_str("src").unwrap_or("").to_string(),
            });
        }
    }
    for entry in doc.get_array(POPULATION_FREQ).unwrap_or(&[]) {
        if let Some(freq_doc) = entry.as_document() {
            annotation.population_frequencies.push(PopulationFrequency {
                study: freq_doc.get_str("st").unwrap_or("").to_string(),
                population: freq_doc.get_str("pop").unwrap_or("").to_string(),
                ref_freq: freq_doc.get_double("refF").unwrap_or(0.0),
                alt_freq: freq_doc.get_double("altF").unwrap_or(0.0),
            });
        }
    }
    annotation.conservation_scores = doc.get_array(CONSERVATION).unwrap_or(&[]).iter()
        .filter_map(|v| v.as_document())
        .map(decode_score)
        .collect();
    annotation.functional_scores = doc.get_array(FUNCTIONAL).unwrap_or(&[]).iter()
        .filter_map(|v| v.as_document())
        .map(decode_score)
        .collect();
    for entry in doc.get_array(REPEATS).unwrap_or(&[]) {
        if let Some(repeat_doc) = entry.as_document() {
            annotation.repeats.push(Repeat {
                id: repeat_doc.get_str("id").unwrap_or("").to_string(),
                source: repeat_doc.get_str("src").unwrap_or("").to_string(),
            });
        }
    }
    if let Some(extra) = doc.get_document("extra") {
        for (extra_key, value) in extra.iter() {
            if let Some(text) = value.as_str() {
                annotation.extra.insert(extra_key.clone(), text.to_string());
            }
        }
    }
    annotation
}

//-----------------------------------------------------------------------------

fn string_array(values: &[String]) -> Vec<Value> {
    values.iter().map(|v| Value::from(v.as_str())).collect()
}

fn decode_string_array(array: Option<&[Value]>) -> Vec<String> {
    array.unwrap_or(&[]).iter()
        .filter_map(|v| v.as_str())
        .map(String::from)
        .collect()
}

//-----------------------------------------------------------------------------
