//! The variant data model.
//!
//! These are the in-memory counterparts of the stored documents. They are
//! built once by the decoders and then treated as read-only; all mutation
//! happens by re-encoding a new document.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

//-----------------------------------------------------------------------------

/// Type of a genomic variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariantType {
    Snv,
    Mnv,
    Indel,
    Insertion,
    Deletion,
    Cnv,
    Duplication,
    Inversion,
    Translocation,
    Breakend,
    NoVariation,
    Symbolic,
}

impl VariantType {
    /// Subtypes implied when this type is used as a filter value.
    ///
    /// Querying for an aggregate type also matches its more specific forms.
    pub fn subtypes(self) -> &'static [VariantType] {
        match self {
            VariantType::Snv => &[VariantType::Mnv],
            VariantType::Indel => &[VariantType::Insertion, VariantType::Deletion],
            VariantType::Cnv => &[VariantType::Duplication],
            VariantType::Symbolic => &[
                VariantType::Cnv, VariantType::Duplication, VariantType::Inversion,
                VariantType::Translocation, VariantType::Breakend,
            ],
            _ => &[],
        }
    }

    /// Parses the name used in stored documents and filter values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "SNV" | "SNP" => Some(VariantType::Snv),
            "MNV" | "MNP" => Some(VariantType::Mnv),
            "INDEL" => Some(VariantType::Indel),
            "INSERTION" => Some(VariantType::Insertion),
            "DELETION" => Some(VariantType::Deletion),
            "CNV" => Some(VariantType::Cnv),
            "DUPLICATION" => Some(VariantType::Duplication),
            "INVERSION" => Some(VariantType::Inversion),
            "TRANSLOCATION" => Some(VariantType::Translocation),
            "BREAKEND" | "BND" => Some(VariantType::Breakend),
            "NO_VARIATION" => Some(VariantType::NoVariation),
            "SYMBOLIC" => Some(VariantType::Symbolic),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VariantType::Snv => "SNV",
            VariantType::Mnv => "MNV",
            VariantType::Indel => "INDEL",
            VariantType::Insertion => "INSERTION",
            VariantType::Deletion => "DELETION",
            VariantType::Cnv => "CNV",
            VariantType::Duplication => "DUPLICATION",
            VariantType::Inversion => "INVERSION",
            VariantType::Translocation => "TRANSLOCATION",
            VariantType::Breakend => "BREAKEND",
            VariantType::NoVariation => "NO_VARIATION",
            VariantType::Symbolic => "SYMBOLIC",
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//-----------------------------------------------------------------------------

/// Orientation of a breakend mate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakendOrientation {
    StartStart,
    StartEnd,
    EndStart,
    EndEnd,
}

/// The far end of a breakend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakendMate {
    pub chromosome: String,
    pub position: i64,
    pub ci_left: Option<i64>,
    pub ci_right: Option<i64>,
}

/// A breakend rearrangement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Breakend {
    pub mate: BreakendMate,
    pub orientation: BreakendOrientation,
    pub inserted_sequence: Option<String>,
}

/// Structural detail present only on structural variants.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralVariant {
    pub ci_start_left: Option<i64>,
    pub ci_start_right: Option<i64>,
    pub ci_end_left: Option<i64>,
    pub ci_end_right: Option<i64>,
    pub copy_number: Option<i32>,
    pub inserted_sequence_left: Option<String>,
    pub inserted_sequence_right: Option<String>,
    pub breakend: Option<Breakend>,
}

impl StructuralVariant {
    /// Returns `true` if no structural field is set.
    pub fn is_empty(&self) -> bool {
        *self == StructuralVariant::default()
    }
}

//-----------------------------------------------------------------------------

/// A secondary alternate allele with its own coordinates.
///
/// Fields equal to the primary variant's coordinates may be omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlternateCoordinate {
    pub chromosome: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub reference: Option<String>,
    pub alternate: String,
    pub variant_type: Option<VariantType>,
}

impl AlternateCoordinate {
    /// A canonical signature for grouping files by their alternate lists.
    pub fn signature(&self) -> String {
        format!(
            "{}:{}:{}",
            self.chromosome.as_deref().unwrap_or(""),
            self.start.unwrap_or(0),
            self.alternate
        )
    }
}

/// The original file line a normalized variant came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginalCall {
    pub variant_id: String,
    pub allele_index: i32,
}

//-----------------------------------------------------------------------------

/// Data loaded from one source file into a study.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File identifier. Negative values mark an overlapping record of a file
    /// whose variant was not exactly this one.
    pub file_id: i32,
    /// FILTER, QUAL and free-form attributes from the source file.
    pub attributes: BTreeMap<String, String>,
    /// Secondary alternates as they appeared in this file.
    pub secondary_alternates: Vec<AlternateCoordinate>,
    pub original_call: Option<OriginalCall>,
    /// Genotype string to the ordered sample ids carrying it.
    /// Samples with the study's default genotype are absent.
    pub genotypes: BTreeMap<String, Vec<i32>>,
    /// Lowercased format key to its encoded per-sample blob.
    pub sample_data: BTreeMap<String, Vec<u8>>,
}

impl FileRecord {
    pub fn new(file_id: i32) -> Self {
        FileRecord { file_id, ..FileRecord::default() }
    }

    /// The file id without the overlap marker.
    pub fn absolute_id(&self) -> i32 {
        self.file_id.abs()
    }
}

/// Cohort-level statistics of a variant within a study.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
    pub study_id: i32,
    pub cohort_id: i32,
    pub maf: f64,
    pub mgf: f64,
    pub maf_allele: Option<String>,
    pub mgf_genotype: Option<String>,
    pub missing_alleles: i64,
    pub missing_genotypes: i64,
    pub allele_freq: Vec<(String, f64)>,
    pub genotype_freq: Vec<(String, f64)>,
}

/// All data of a variant within one study.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub study_id: i32,
    pub files: Vec<FileRecord>,
    pub stats: Vec<VariantStats>,
    /// Secondary alternates after reconciling the per-file lists.
    pub secondary_alternates: Vec<AlternateCoordinate>,
}

impl StudyRecord {
    pub fn new(study_id: i32) -> Self {
        StudyRecord { study_id, ..StudyRecord::default() }
    }
}

//-----------------------------------------------------------------------------

/// A functional score with its source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub source: String,
    pub score: f64,
    pub description: Option<String>,
}

/// Frequency of the variant in a population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationFrequency {
    pub study: String,
    pub population: String,
    pub ref_freq: f64,
    pub alt_freq: f64,
}

/// A cross-reference identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Xref {
    pub id: String,
    pub source: String,
}

/// A repeat region overlapping the variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repeat {
    pub id: String,
    pub source: String,
}

/// Protein-level annotation of a consequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProteinAnnotation {
    pub sift: Option<Score>,
    pub polyphen: Option<Score>,
    pub keywords: Vec<String>,
}

/// A predicted consequence on one transcript.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsequenceType {
    pub gene_name: Option<String>,
    pub ensembl_gene_id: Option<String>,
    pub ensembl_transcript_id: Option<String>,
    pub biotype: Option<String>,
    /// Sequence Ontology accession numbers.
    pub so_accessions: Vec<u32>,
    pub transcript_flags: Vec<String>,
    pub protein: Option<ProteinAnnotation>,
}

/// One generation of variant annotation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Generation identifier, e.g. an annotation source release.
    pub annotation_id: String,
    pub consequence_types: Vec<ConsequenceType>,
    pub xrefs: Vec<Xref>,
    pub population_frequencies: Vec<PopulationFrequency>,
    pub conservation_scores: Vec<Score>,
    pub functional_scores: Vec<Score>,
    pub repeats: Vec<Repeat>,
    /// Free-form per-generation metadata.
    pub extra: BTreeMap<String, String>,
}

//-----------------------------------------------------------------------------

/// A genomic variant with its per-study data and annotation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub reference: String,
    pub alternate: String,
    pub variant_type: Option<VariantType>,
    /// Known identifiers (rs numbers and the like).
    pub ids: Vec<String>,
    pub sv: Option<StructuralVariant>,
    pub studies: Vec<StudyRecord>,
    /// Annotation generations keyed by generation id.
    pub annotation: BTreeMap<String, Annotation>,
    /// Release in which the variant first appeared.
    pub release: Option<i32>,
}

impl Variant {
    pub fn new(chromosome: &str, start: i64, reference: &str, alternate: &str) -> Self {
        let length = reference.len().max(alternate.len()) as i64;
        let end = start + (reference.len() as i64).max(1) - 1;
        let variant_type = if reference.len() == 1 && alternate.len() == 1 {
            Some(VariantType::Snv)
        } else if reference.len() == alternate.len() && !reference.is_empty() {
            Some(VariantType::Mnv)
        } else if length <= 50 {
            Some(VariantType::Indel)
        } else {
            Some(VariantType::Symbolic)
        };
        Variant {
            chromosome: chromosome.to_string(),
            start, end,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
            variant_type,
            ..Variant::default()
        }
    }

    /// The natural string form: `chromosome:start:reference:alternate`.
    ///
    /// Empty alleles render as `-`.
    pub fn to_id_string(&self) -> String {
        fn render(allele: &str) -> &str {
            if allele.is_empty() { "-" } else { allele }
        }
        format!(
            "{}:{}:{}:{}",
            self.chromosome, self.start,
            render(&self.reference), render(&self.alternate)
        )
    }

    /// Parses the natural string form.
    pub fn parse_id_string(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.split(':').collect();
        let (chromosome, start, reference, alternate) = match parts.as_slice() {
            [chromosome, start, alternate] => (*chromosome, *start, "", *alternate),
            [chromosome, start, reference, alternate] => (*chromosome, *start, *reference, *alternate),
            _ => return None,
        };
        let start: i64 = start.trim().parse().ok()?;
        fn clean(allele: &str) -> &str {
            if allele == "-" { "" } else { allele }
        }
        Some(Variant::new(chromosome, start, clean(reference), clean(alternate)))
    }

    /// Returns the study record with the given id.
    pub fn study(&self, study_id: i32) -> Option<&StudyRecord> {
        self.studies.iter().find(|s| s.study_id == study_id)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_id_string())
    }
}

//-----------------------------------------------------------------------------

/// A document moved aside by a purge operation.
#[derive(Clone, Debug, PartialEq)]
pub struct TrashEntry {
    pub key: String,
    pub deleted_at: i64,
    pub document: crate::document::Document,
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_string_roundtrip() {
        let variant = Variant::new("22", 16050075, "A", "T");
        assert_eq!(variant.to_id_string(), "22:16050075:A:T", "Wrong id string");
        let parsed = Variant::parse_id_string("22:16050075:A:T").unwrap();
        assert_eq!(parsed.chromosome, "22");
        assert_eq!(parsed.start, 16050075);

        let deletion = Variant::new("1", 1000, "AC", "");
        assert_eq!(deletion.to_id_string(), "1:1000:AC:-", "Empty allele should render as -");
        let parsed = Variant::parse_id_string("1:1000:AC:-").unwrap();
        assert_eq!(parsed.alternate, "", "Dash should parse back to an empty allele");

        // Three-part form implies an empty reference.
        let insertion = Variant::parse_id_string("1:1000:ACGT").unwrap();
        assert_eq!(insertion.reference, "");
        assert_eq!(insertion.alternate, "ACGT");
    }

    #[test]
    fn type_subtypes() {
        assert!(VariantType::Indel.subtypes().contains(&VariantType::Insertion));
        assert!(VariantType::Snv.subtypes().contains(&VariantType::Mnv));
        assert!(VariantType::Breakend.subtypes().is_empty());
        assert_eq!(VariantType::parse("BND"), Some(VariantType::Breakend));
        assert_eq!(VariantType::parse("snp"), Some(VariantType::Snv));
        assert_eq!(VariantType::parse("bogus"), None);
    }

    #[test]
    fn inferred_types() {
        assert_eq!(Variant::new("1", 100, "A", "T").variant_type, Some(VariantType::Snv));
        assert_eq!(Variant::new("1", 100, "AC", "GT").variant_type, Some(VariantType::Mnv));
        assert_eq!(Variant::new("1", 100, "A", "").variant_type, Some(VariantType::Indel));
        assert_eq!(Variant::new("1", 100, "", "ACGT").variant_type, Some(VariantType::Indel));
    }
}

//-----------------------------------------------------------------------------
