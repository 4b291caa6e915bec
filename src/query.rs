//! Filter queries and their compilation into predicates.
//!
//! A [`VariantQuery`] is an ordered set of raw filter strings keyed by
//! [`QueryField`]. The [`QueryCompiler`] resolves names through the study
//! metadata and builds a [`Predicate`] tree. Compilation is deterministic:
//! the same query always produces a structurally equal predicate.
//!
//! The filter grammar is shared by all fields: `,` separates alternatives,
//! `;` separates conjuncts (mixing the two is an error), a leading `!`
//! negates one value, and comparison filters accept the operators
//! `=`, `==`, `!=`, `<`, `<=`, `>`, `>=` and `~=` (regex). The doubled
//! forms `<<`, `<<=`, `>>` and `>>=` additionally match documents where
//! the compared field is absent.

use crate::error::StorageError;
use crate::key;
use crate::metadata::StudyMetadata;
use crate::predicate::{CmpOp, Predicate};
use crate::sample::{self, UNKNOWN_GENOTYPE};
use crate::schema::{self, Projection};
use crate::document::Value;
use crate::utils::{self, ListOperator};
use crate::variant::{Variant, VariantType};

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use tracing::debug;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// The registered filter fields.
///
/// Every filter a query may carry is listed here; there is no reflection or
/// dynamic registration. Backends that cannot compile a field report
/// [`StorageError::UnsupportedFilter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueryField {
    /// Genomic regions, `chr[:start[-end]]`.
    Region,
    /// Variant identifiers (rs numbers or `chr:start:ref:alt`).
    Id,
    /// Exact variants in `chr:start:ref:alt` form; an intersect anchor.
    ExactVariant,
    /// Cross-reference identifiers from annotation.
    Xref,
    /// Gene names, combined with consequence type, biotype and flags.
    Gene,
    /// Variant types; aggregate types include their subtypes.
    VariantType,
    Study,
    File,
    /// FILTER status of the source files.
    Filter,
    /// QUAL of the source files.
    Qual,
    /// Per-sample genotypes, `sample:gt[,gt..][;sample:gt..]`.
    Genotype,
    /// Samples carrying a main (non-reference) genotype.
    Sample,
    /// Cohorts with computed statistics, `[study:]cohort`.
    Cohort,
    /// Minor allele frequency, `[study:]cohort{op}{value}`.
    StatsMaf,
    /// Minor genotype frequency, `[study:]cohort{op}{value}`.
    StatsMgf,
    MissingAlleles,
    MissingGenotypes,
    /// Sequence Ontology accessions, `SO:N` or numeric.
    ConsequenceType,
    Biotype,
    TranscriptFlag,
    /// `true` or `false`: whether the variant has annotation.
    AnnotationExists,
    /// Protein substitution scores, `{source}{op}{value}`.
    ProteinSubstitution,
    /// Conservation scores, `{source}{op}{value}`.
    Conservation,
    /// Functional scores, `{source}{op}{value}`.
    FunctionalScore,
    /// Population alternate allele frequency, `{study}:{pop}{op}{value}`.
    PopulationAltFrequency,
    /// Population reference allele frequency, `{study}:{pop}{op}{value}`.
    PopulationRefFrequency,
    /// Highest release the results may come from.
    Release,
}

impl QueryField {
    /// The external name of the field, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            QueryField::Region => "region",
            QueryField::Id => "id",
            QueryField::ExactVariant => "variant",
            QueryField::Xref => "xref",
            QueryField::Gene => "gene",
            QueryField::VariantType => "type",
            QueryField::Study => "study",
            QueryField::File => "file",
            QueryField::Filter => "filter",
            QueryField::Qual => "qual",
            QueryField::Genotype => "genotype",
            QueryField::Sample => "sample",
            QueryField::Cohort => "cohort",
            QueryField::StatsMaf => "statsMaf",
            QueryField::StatsMgf => "statsMgf",
            QueryField::MissingAlleles => "missingAlleles",
            QueryField::MissingGenotypes => "missingGenotypes",
            QueryField::ConsequenceType => "ct",
            QueryField::Biotype => "biotype",
            QueryField::TranscriptFlag => "transcriptFlag",
            QueryField::AnnotationExists => "annotationExists",
            QueryField::ProteinSubstitution => "proteinSubstitution",
            QueryField::Conservation => "conservation",
            QueryField::FunctionalScore => "functionalScore",
            QueryField::PopulationAltFrequency => "populationFrequencyAlt",
            QueryField::PopulationRefFrequency => "populationFrequencyRef",
            QueryField::Release => "release",
        }
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//-----------------------------------------------------------------------------

/// A filter query: raw filter strings keyed by field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariantQuery {
    filters: BTreeMap<QueryField, String>,
}

impl VariantQuery {
    pub fn new() -> Self {
        VariantQuery::default()
    }

    /// Builder-style filter setter.
    pub fn with(mut self, field: QueryField, value: &str) -> Self {
        self.filters.insert(field, value.to_string());
        self
    }

    pub fn set(&mut self, field: QueryField, value: &str) {
        self.filters.insert(field, value.to_string());
    }

    pub fn get(&self, field: QueryField) -> Option<&str> {
        self.filters.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = QueryField> + '_ {
        self.filters.keys().copied()
    }
}

//-----------------------------------------------------------------------------

/// A genomic region, `chr[:start[-end]]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub chromosome: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl Region {
    /// Parses a region string. A bare chromosome covers the whole chromosome
    /// and a single position is a one-base region.
    pub fn parse(value: &str) -> Option<Self> {
        let (chromosome, rest) = match value.split_once(':') {
            Some((chromosome, rest)) => (chromosome, Some(rest)),
            None => (value, None),
        };
        if chromosome.is_empty() {
            return None;
        }
        let chromosome = chromosome.trim_start_matches("chr").to_string();
        let Some(rest) = rest else {
            return Some(Region { chromosome, start: None, end: None });
        };
        match rest.split_once('-') {
            Some((start, end)) => {
                let start: i64 = start.replace(',', "").parse().ok()?;
                let end: i64 = end.replace(',', "").parse().ok()?;
                if end < start {
                    return None;
                }
                Some(Region { chromosome, start: Some(start), end: Some(end) })
            }
            None => {
                let position: i64 = rest.replace(',', "").parse().ok()?;
                Some(Region { chromosome, start: Some(position), end: Some(position) })
            }
        }
    }

    /// The key range `[low, high)` covering this region.
    pub fn key_range(&self) -> (String, String) {
        let low = key::VariantKey::prefix(&self.chromosome, self.start.unwrap_or(0));
        let high = match self.end {
            Some(end) => key::VariantKey::prefix(&self.chromosome, end + 1),
            None => key::VariantKey::prefix(&self.chromosome, i64::MAX / 2),
        };
        (low, high)
    }
}

//-----------------------------------------------------------------------------

// Comparison filter parsing.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Matches,
    SoftGt,
    SoftGte,
    SoftLt,
    SoftLte,
}

impl FilterOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" | "==" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            ">" => Some(FilterOp::Gt),
            ">=" => Some(FilterOp::Gte),
            "<" => Some(FilterOp::Lt),
            "<=" => Some(FilterOp::Lte),
            "~=" | "~" => Some(FilterOp::Matches),
            ">>" => Some(FilterOp::SoftGt),
            ">>=" => Some(FilterOp::SoftGte),
            "<<" => Some(FilterOp::SoftLt),
            "<<=" => Some(FilterOp::SoftLte),
            _ => None,
        }
    }

    fn is_soft(self) -> bool {
        matches!(self, FilterOp::SoftGt | FilterOp::SoftGte | FilterOp::SoftLt | FilterOp::SoftLte)
    }

    fn cmp_op(self) -> Option<CmpOp> {
        match self {
            FilterOp::Eq => Some(CmpOp::Eq),
            FilterOp::Ne => Some(CmpOp::Ne),
            FilterOp::Gt | FilterOp::SoftGt => Some(CmpOp::Gt),
            FilterOp::Gte | FilterOp::SoftGte => Some(CmpOp::Gte),
            FilterOp::Lt | FilterOp::SoftLt => Some(CmpOp::Lt),
            FilterOp::Lte | FilterOp::SoftLte => Some(CmpOp::Lte),
            FilterOp::Matches => None,
        }
    }
}

/// Splits `{key}{op}{value}` at the first operator character.
fn split_operator(value: &str) -> Option<(&str, FilterOp, &str)> {
    let start = value.find(|c| "<>=!~".contains(c))?;
    let rest = &value[start..];
    let op_len = rest.chars().take_while(|c| "<>=!~".contains(*c)).count();
    let op = FilterOp::parse(&rest[..op_len])?;
    Some((&value[..start], op, &rest[op_len..]))
}

//-----------------------------------------------------------------------------

// Stored field paths.

fn studies_path(tail: &str) -> String {
    format!("{}.{}", schema::STUDIES, tail)
}

fn files_path(tail: &str) -> String {
    format!("{}.{}", schema::FILES, tail)
}

fn annot_path(tail: &str) -> String {
    format!("{}.{}", schema::ANNOTATION, tail)
}

fn ct_path(tail: &str) -> String {
    annot_path(&format!("{}.{}", schema::CONSEQUENCE_TYPES, tail))
}

//-----------------------------------------------------------------------------

/// Compiles [`VariantQuery`] values into [`Predicate`] trees.
pub struct QueryCompiler<'a> {
    metadata: &'a dyn StudyMetadata,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(metadata: &'a dyn StudyMetadata) -> Self {
        QueryCompiler { metadata }
    }

    /// Compiles the query.
    ///
    /// The result is a conjunction of: the exact-variant anchor, the
    /// disjunction of region-like filters (regions, ids, xrefs, genes), and
    /// one conjunct per remaining filter group.
    pub fn compile(&self, query: &VariantQuery) -> Result<Predicate, StorageError> {
        let mut conjuncts: Vec<Predicate> = Vec::new();
        let release = self.parse_release(query)?;

        if let Some(value) = query.get(QueryField::ExactVariant) {
            conjuncts.push(self.compile_exact_variants(value)?);
        }
        if let Some(part) = self.compile_region_like(query)? {
            conjuncts.push(part);
        }
        if let Some(part) = self.compile_annotation_filters(query)? {
            conjuncts.push(part);
        }
        if let Some(value) = query.get(QueryField::VariantType) {
            conjuncts.push(self.compile_type(value)?);
        }
        if let Some(part) = self.compile_study_filters(query, release)? {
            conjuncts.push(part);
        }
        if let Some(part) = self.compile_stats_filters(query)? {
            conjuncts.push(part);
        }
        if let Some(release) = release {
            conjuncts.push(Predicate::cmp(schema::RELEASE, CmpOp::Lte, release as i64));
        }

        let predicate = Predicate::and(conjuncts);
        debug!(?predicate, "compiled query");
        Ok(predicate)
    }

    /// Lists the stored document sections a projection needs.
    pub fn compile_projection(&self, projection: &Projection) -> Vec<&'static str> {
        let mut sections = vec![
            schema::CHROMOSOME, schema::START, schema::END, schema::LENGTH,
            schema::REFERENCE, schema::ALTERNATE, schema::TYPE, schema::ID_STRING,
            schema::IDS, schema::SV, schema::RELEASE,
        ];
        if !projection.exclude_studies {
            sections.push(schema::STUDIES);
        }
        if !projection.exclude_stats {
            sections.push(schema::STATS);
        }
        if !projection.exclude_annotation {
            sections.push(schema::ANNOTATION);
            sections.push(schema::CUSTOM_ANNOTATION);
        }
        sections
    }

    /// The key ranges a compiled query can be prefiltered with, if any.
    pub fn key_ranges(&self, query: &VariantQuery) -> Vec<(String, String)> {
        let mut ranges = Vec::new();
        if let Some(value) = query.get(QueryField::Region) {
            if let Some((_, parts)) = utils::split_list(value) {
                for part in parts {
                    if let Some(region) = Region::parse(part) {
                        ranges.push(region.key_range());
                    }
                }
            }
        }
        ranges
    }

    //-------------------------------------------------------------------------

    fn parse_release(&self, query: &VariantQuery) -> Result<Option<i32>, StorageError> {
        let Some(value) = query.get(QueryField::Release) else { return Ok(None) };
        value.parse::<i32>()
            .map(Some)
            .map_err(|_| StorageError::malformed(
                QueryField::Release.name(), value, "expected an integer release",
            ))
    }

    fn compile_exact_variants(&self, value: &str) -> Result<Predicate, StorageError> {
        let (op, parts) = self.or_list(QueryField::ExactVariant, value)?;
        if op == ListOperator::And && parts.len() > 1 {
            return Err(StorageError::malformed(
                QueryField::ExactVariant.name(), value,
                "a variant list cannot be a conjunction",
            ));
        }
        let mut ids = Vec::new();
        for part in parts {
            let variant = Variant::parse_id_string(part).ok_or_else(|| {
                StorageError::malformed(
                    QueryField::ExactVariant.name(), part, "expected chr:start:ref:alt",
                )
            })?;
            ids.push(Value::from(variant.to_id_string()));
        }
        Ok(Predicate::is_in(schema::ID_STRING, ids))
    }

    /// Regions, ids, xrefs and genes combine into one disjunction. The gene
    /// filter contributes its combination keys as one member; when other
    /// members are present, the plain consequence type, biotype and flag
    /// filters are applied separately so that region matches stay within
    /// the functional restriction.
    fn compile_region_like(&self, query: &VariantQuery) -> Result<Option<Predicate>, StorageError> {
        let mut members: Vec<Predicate> = Vec::new();

        if let Some(value) = query.get(QueryField::Region) {
            let (_, parts) = self.or_list(QueryField::Region, value)?;
            let mut regions = Vec::new();
            for part in parts {
                let region = Region::parse(part).ok_or_else(|| {
                    StorageError::malformed(QueryField::Region.name(), part, "expected chr[:start[-end]]")
                })?;
                regions.push(self.region_predicate(&region));
            }
            members.push(Predicate::or(regions));
        }
        if let Some(value) = query.get(QueryField::Id) {
            let (_, parts) = self.or_list(QueryField::Id, value)?;
            let values: Vec<Value> = parts.iter().map(|p| Value::from(*p)).collect();
            members.push(Predicate::or(vec![
                Predicate::is_in(schema::IDS, values.clone()),
                Predicate::is_in(schema::ID_STRING, values),
            ]));
        }
        if let Some(value) = query.get(QueryField::Xref) {
            let (_, parts) = self.or_list(QueryField::Xref, value)?;
            let values: Vec<Value> = parts.iter().map(|p| Value::from(*p)).collect();
            members.push(Predicate::or(vec![
                Predicate::is_in(&annot_path(&format!("{}.id", schema::XREFS)), values.clone()),
                Predicate::is_in(schema::IDS, values),
            ]));
        }

        if let Some(combination) = self.compile_gene_combination(query)? {
            members.push(combination);
        }

        if members.is_empty() {
            return Ok(None);
        }
        Ok(Some(Predicate::or(members)))
    }

    fn region_predicate(&self, region: &Region) -> Predicate {
        let mut parts = vec![Predicate::eq(schema::CHROMOSOME, region.chromosome.as_str())];
        if let Some(start) = region.start {
            parts.push(Predicate::cmp(schema::START, CmpOp::Gte, start));
        }
        if let Some(end) = region.end {
            parts.push(Predicate::cmp(schema::START, CmpOp::Lte, end));
        }
        Predicate::and(parts)
    }

    /// The gene filter against the stored combination keys.
    ///
    /// A combination key joins gene, biotype and SO accession with `_`,
    /// plus one transcript flag. Unconstrained middle parts become regex
    /// wildcards; a fully constrained combination is an exact membership
    /// test.
    fn compile_gene_combination(&self, query: &VariantQuery)
        -> Result<Option<Predicate>, StorageError>
    {
        let Some(genes) = query.get(QueryField::Gene) else { return Ok(None) };
        let (_, genes) = self.or_list(QueryField::Gene, genes)?;
        let biotypes = self.optional_or_list(query, QueryField::Biotype)?;
        let so_terms = match query.get(QueryField::ConsequenceType) {
            Some(value) => {
                let (_, parts) = self.or_list(QueryField::ConsequenceType, value)?;
                let mut accessions = Vec::new();
                for part in parts {
                    accessions.push(parse_so_accession(part)?);
                }
                Some(accessions)
            }
            None => None,
        };
        let flags = self.optional_or_list(query, QueryField::TranscriptFlag)?;

        let path = annot_path(schema::COMBINATIONS);
        let fully_constrained = biotypes.is_some() && so_terms.is_some() && flags.is_some();
        if fully_constrained {
            let mut keys = Vec::new();
            for gene in &genes {
                for biotype in biotypes.as_deref().unwrap_or(&[]) {
                    for so in so_terms.as_deref().unwrap_or(&[]) {
                        for flag in flags.as_deref().unwrap_or(&[]) {
                            keys.push(Value::from(format!("{}_{}_{}_{}", gene, biotype, so, flag)));
                        }
                    }
                }
            }
            return Ok(Some(Predicate::is_in(&path, keys)));
        }

        // Partially constrained combinations become anchored patterns.
        let mut patterns = Vec::new();
        for gene in &genes {
            let mut pattern = format!("^{}", regex::escape(gene));
            match &biotypes {
                Some(biotypes) => {
                    let options: Vec<String> = biotypes.iter().map(|b| regex::escape(b)).collect();
                    pattern.push_str(&format!("_(?:{})", options.join("|")));
                }
                None => {
                    if so_terms.is_some() || flags.is_some() {
                        pattern.push_str("(?:_.+)??");
                    }
                }
            }
            if let Some(so_terms) = &so_terms {
                let options: Vec<String> = so_terms.iter().map(|so| so.to_string()).collect();
                pattern.push_str(&format!("_(?:{})", options.join("|")));
            }
            match &flags {
                Some(flags) => {
                    let options: Vec<String> = flags.iter().map(|f| regex::escape(f)).collect();
                    pattern.push_str(&format!("_(?:{})$", options.join("|")));
                }
                None => pattern.push_str("(?:_.*)?$"),
            }
            validate_pattern(QueryField::Gene, &pattern)?;
            patterns.push(Predicate::Regex { path: path.clone(), pattern });
        }
        Ok(Some(Predicate::or(patterns)))
    }

    /// Consequence type, biotype and transcript flag filters outside the
    /// gene combination. When the gene filter is the only region-like
    /// filter, these fields are already folded into the combination keys;
    /// otherwise the plain filters constrain the region, id and xref
    /// members of the disjunction too.
    fn compile_annotation_filters(&self, query: &VariantQuery)
        -> Result<Option<Predicate>, StorageError>
    {
        let mut parts = Vec::new();
        let gene_alone = query.get(QueryField::Gene).is_some()
            && query.get(QueryField::Region).is_none()
            && query.get(QueryField::Id).is_none()
            && query.get(QueryField::Xref).is_none();

        if !gene_alone {
            if let Some(value) = query.get(QueryField::ConsequenceType) {
                let (op, terms) = self.or_list(QueryField::ConsequenceType, value)?;
                let mut accessions = Vec::new();
                for term in terms {
                    accessions.push(Value::from(parse_so_accession(term)? as i64));
                }
                let path = ct_path(schema::SO_ACCESSIONS);
                parts.push(match op {
                    ListOperator::Or => Predicate::is_in(&path, accessions),
                    ListOperator::And => Predicate::All { path, values: accessions },
                });
            }
            if let Some(biotypes) = self.optional_or_list(query, QueryField::Biotype)? {
                let values = biotypes.iter().map(|b| Value::from(b.as_str())).collect();
                parts.push(Predicate::is_in(&ct_path(schema::BIOTYPE), values));
            }
            if let Some(flags) = self.optional_or_list(query, QueryField::TranscriptFlag)? {
                let values = flags.iter().map(|f| Value::from(f.as_str())).collect();
                parts.push(Predicate::is_in(&ct_path(schema::TRANSCRIPT_FLAGS), values));
            }
        }

        if let Some(value) = query.get(QueryField::AnnotationExists) {
            let exists = match value {
                "true" | "TRUE" => true,
                "false" | "FALSE" => false,
                _ => return Err(StorageError::malformed(
                    QueryField::AnnotationExists.name(), value, "expected true or false",
                )),
            };
            parts.push(Predicate::Exists { path: schema::ANNOTATION.to_string(), exists });
        }
        if let Some(value) = query.get(QueryField::ProteinSubstitution) {
            parts.push(self.compile_protein_substitution(value)?);
        }
        if let Some(value) = query.get(QueryField::Conservation) {
            parts.push(self.compile_score_list(
                QueryField::Conservation, value, schema::CONSERVATION,
                &["gerp", "phastCons", "phylop"],
            )?);
        }
        if let Some(value) = query.get(QueryField::FunctionalScore) {
            parts.push(self.compile_score_list(
                QueryField::FunctionalScore, value, schema::FUNCTIONAL,
                &["cadd_raw", "cadd_scaled"],
            )?);
        }
        if let Some(value) = query.get(QueryField::PopulationAltFrequency) {
            parts.push(self.compile_population_frequency(
                QueryField::PopulationAltFrequency, value, "altF",
            )?);
        }
        if let Some(value) = query.get(QueryField::PopulationRefFrequency) {
            parts.push(self.compile_population_frequency(
                QueryField::PopulationRefFrequency, value, "refF",
            )?);
        }

        if parts.is_empty() { Ok(None) } else { Ok(Some(Predicate::and(parts))) }
    }

    fn compile_type(&self, value: &str) -> Result<Predicate, StorageError> {
        let (_, parts) = self.or_list(QueryField::VariantType, value)?;
        let mut names: Vec<Value> = Vec::new();
        for part in parts {
            let variant_type = VariantType::parse(part).ok_or_else(|| {
                StorageError::malformed(QueryField::VariantType.name(), part, "unknown variant type")
            })?;
            names.push(Value::from(variant_type.name()));
            for subtype in variant_type.subtypes() {
                let name = Value::from(subtype.name());
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(Predicate::is_in(schema::TYPE, names))
    }

    //-------------------------------------------------------------------------

    /// Study, file, FILTER, QUAL, genotype and sample filters. Conditions
    /// that refer to data inside one study are bound together with an
    /// element match, so they cannot be satisfied across different studies.
    fn compile_study_filters(&self, query: &VariantQuery, release: Option<i32>)
        -> Result<Option<Predicate>, StorageError>
    {
        let mut outer: Vec<Predicate> = Vec::new();
        let mut scoped: Vec<Predicate> = Vec::new();

        let needs_scope = query.get(QueryField::File).is_some()
            || query.get(QueryField::Filter).is_some()
            || query.get(QueryField::Qual).is_some()
            || query.get(QueryField::Genotype).is_some()
            || query.get(QueryField::Sample).is_some()
            || query.get(QueryField::Cohort).is_some();

        if let Some(value) = query.get(QueryField::Study) {
            let (op, parts) = utils::split_list(value).ok_or_else(|| {
                StorageError::malformed(QueryField::Study.name(), value, "mixed , and ;")
            })?;
            let mut positives = Vec::new();
            let mut negatives = Vec::new();
            for part in parts {
                let (negated, name) = utils::strip_negation(part);
                if negated && op == ListOperator::Or {
                    return Err(StorageError::malformed(
                        QueryField::Study.name(), part, "negation is not allowed in a disjunction",
                    ));
                }
                let id = self.metadata.study_id(name)? as i64;
                if negated { negatives.push(id) } else { positives.push(id) }
            }
            let path = studies_path(schema::STUDY_ID);
            match op {
                ListOperator::Or => {
                    outer.push(Predicate::is_in(&path, positives.into_iter().map(Value::from).collect()));
                }
                ListOperator::And => {
                    let mut conds: Vec<Predicate> = positives.into_iter()
                        .map(|id| Predicate::eq(&path, id))
                        .collect();
                    if !negatives.is_empty() {
                        conds.push(Predicate::NotIn {
                            path: path.clone(),
                            values: negatives.into_iter().map(Value::from).collect(),
                        });
                    }
                    outer.push(Predicate::and(conds));
                }
            }
        }

        if !needs_scope {
            return Ok(if outer.is_empty() { None } else { Some(Predicate::and(outer)) });
        }

        let study_id = self.default_study(query)?;

        if let Some(value) = query.get(QueryField::File) {
            scoped.push(self.compile_file_filter(query, study_id, value, release)?);
        } else {
            // FILTER and QUAL without a file filter apply across all files.
            if let Some(value) = query.get(QueryField::Filter) {
                scoped.push(self.compile_filter_status(value, &files_path(
                    &format!("{}.{}", schema::ATTRIBUTES, schema::FILTER_ATTR)))?);
            }
            if let Some(value) = query.get(QueryField::Qual) {
                scoped.push(self.compile_qual(value, &files_path(
                    &format!("{}.{}", schema::ATTRIBUTES, schema::QUAL_ATTR)))?);
            }
        }

        if let Some(value) = query.get(QueryField::Genotype) {
            scoped.extend(self.compile_genotypes(study_id, value, release)?);
        }
        if let Some(value) = query.get(QueryField::Sample) {
            scoped.extend(self.compile_samples(study_id, value, release)?);
        }

        if let Some(value) = query.get(QueryField::Cohort) {
            outer.push(self.compile_cohort(study_id, value)?);
        }

        let mut study_scope = vec![Predicate::eq(schema::STUDY_ID, study_id as i64)];
        study_scope.extend(scoped);
        outer.push(Predicate::elem_match(schema::STUDIES, Predicate::and(study_scope)));
        Ok(Some(Predicate::and(outer)))
    }

    /// The study that sample, file and cohort names resolve against.
    fn default_study(&self, query: &VariantQuery) -> Result<i32, StorageError> {
        if let Some(value) = query.get(QueryField::Study) {
            let (_, parts) = utils::split_list(value).ok_or_else(|| {
                StorageError::malformed(QueryField::Study.name(), value, "mixed , and ;")
            })?;
            let positives: Vec<&str> = parts.into_iter()
                .filter(|p| !p.starts_with('!'))
                .collect();
            if positives.len() == 1 {
                return self.metadata.study_id(positives[0]);
            }
            return Err(StorageError::malformed(
                QueryField::Study.name(), value,
                "sample, file and cohort filters need exactly one study",
            ));
        }
        let studies = self.metadata.studies();
        match studies.as_slice() {
            [only] => Ok(*only),
            _ => Err(StorageError::MalformedFilter {
                field: QueryField::Study.name().to_string(),
                raw_value: String::new(),
                reason: String::from("sample, file and cohort filters need exactly one study"),
            }),
        }
    }

    fn check_file_release(&self, study: i32, file: i32, release: Option<i32>)
        -> Result<(), StorageError>
    {
        let Some(release) = release else { return Ok(()) };
        if let Some(visible_at) = self.metadata.file_release(study, file)? {
            if visible_at > release {
                return Err(StorageError::StaleReference {
                    field: QueryField::File.name().to_string(),
                    name: self.metadata.file_name(study, file)?,
                    release: visible_at,
                });
            }
        }
        Ok(())
    }

    fn check_sample_release(&self, study: i32, sample_id: i32, release: Option<i32>)
        -> Result<(), StorageError>
    {
        let Some(release) = release else { return Ok(()) };
        if let Some(visible_at) = self.metadata.sample_release(study, sample_id)? {
            if visible_at > release {
                return Err(StorageError::StaleReference {
                    field: QueryField::Sample.name().to_string(),
                    name: self.metadata.sample_name(study, sample_id)?,
                    release: visible_at,
                });
            }
        }
        Ok(())
    }

    /// File filter, with FILTER and QUAL bound per file when present.
    fn compile_file_filter(
        &self, query: &VariantQuery, study: i32, value: &str, release: Option<i32>,
    ) -> Result<Predicate, StorageError> {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(QueryField::File.name(), value, "mixed , and ;")
        })?;
        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        for part in parts {
            let (negated, name) = utils::strip_negation(part);
            if negated && op == ListOperator::Or {
                return Err(StorageError::malformed(
                    QueryField::File.name(), part, "negation is not allowed in a disjunction",
                ));
            }
            let id = self.metadata.file_id(study, name)?;
            self.check_file_release(study, id, release)?;
            if negated { negatives.push(id) } else { positives.push(id) }
        }

        let mut per_file = Vec::new();
        if let Some(filter_value) = query.get(QueryField::Filter) {
            per_file.push(self.compile_filter_status(
                filter_value,
                &format!("{}.{}", schema::ATTRIBUTES, schema::FILTER_ATTR),
            )?);
        }
        if let Some(qual_value) = query.get(QueryField::Qual) {
            per_file.push(self.compile_qual(
                qual_value,
                &format!("{}.{}", schema::ATTRIBUTES, schema::QUAL_ATTR),
            )?);
        }

        let fid = schema::FILE_ID;
        let mut conds = Vec::new();
        match op {
            ListOperator::Or => {
                let mut inner = vec![Predicate::is_in(
                    fid, positives.iter().map(|id| Value::from(*id as i64)).collect(),
                )];
                inner.extend(per_file.clone());
                conds.push(Predicate::elem_match(schema::FILES, Predicate::and(inner)));
            }
            ListOperator::And => {
                for id in &positives {
                    let mut inner = vec![Predicate::eq(fid, *id as i64)];
                    inner.extend(per_file.clone());
                    conds.push(Predicate::elem_match(schema::FILES, Predicate::and(inner)));
                }
                if !negatives.is_empty() {
                    conds.push(Predicate::NotIn {
                        path: files_path(fid),
                        values: negatives.iter().map(|id| Value::from(*id as i64)).collect(),
                    });
                }
                if positives.is_empty() && !per_file.is_empty() {
                    conds.push(Predicate::elem_match(schema::FILES, Predicate::and(per_file.clone())));
                }
            }
        }
        Ok(Predicate::and(conds))
    }

    /// The FILTER status condition against one stored path.
    ///
    /// FILTER values are semicolon-packed in the source files, so plain
    /// statuses match on token boundaries. A value containing regex
    /// metacharacters is taken as a pattern.
    fn compile_filter_status(&self, value: &str, path: &str) -> Result<Predicate, StorageError> {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(QueryField::Filter.name(), value, "mixed , and ;")
        })?;
        let mut conds = Vec::new();
        for part in parts {
            let (negated, status) = utils::strip_negation(part);
            if negated && op == ListOperator::Or {
                return Err(StorageError::malformed(
                    QueryField::Filter.name(), part, "negation is not allowed in a disjunction",
                ));
            }
            let pattern = if is_plain_token(status) {
                format!("(?:^|;){}(?:;|$)", regex::escape(status))
            } else {
                validate_pattern(QueryField::Filter, status)?;
                status.to_string()
            };
            let condition = Predicate::Regex { path: path.to_string(), pattern };
            conds.push(if negated { Predicate::Not(Box::new(condition)) } else { condition });
        }
        Ok(match op {
            ListOperator::Or => Predicate::or(conds),
            ListOperator::And => Predicate::and(conds),
        })
    }

    fn compile_qual(&self, value: &str, path: &str) -> Result<Predicate, StorageError> {
        let (op_str, number) = value.split_at(
            value.chars().take_while(|c| "<>=!".contains(*c)).count()
        );
        let op = FilterOp::parse(if op_str.is_empty() { "=" } else { op_str })
            .ok_or_else(|| StorageError::malformed(
                QueryField::Qual.name(), value, "unknown operator",
            ))?;
        if op.is_soft() {
            return Err(StorageError::unsupported(QueryField::Qual.name()));
        }
        let number: f64 = number.parse().map_err(|_| {
            StorageError::malformed(QueryField::Qual.name(), value, "expected a number")
        })?;
        let cmp = op.cmp_op().ok_or_else(|| StorageError::malformed(
            QueryField::Qual.name(), value, "regex is not valid here",
        ))?;
        Ok(Predicate::cmp(path, cmp, number))
    }

    /// Genotype filter, `sample:gt[,gt..]` entries joined with `;` (all must
    /// hold) or `,` (any may hold). A part without a sample prefix extends
    /// the previous sample's genotype alternatives.
    fn compile_genotypes(&self, study: i32, value: &str, release: Option<i32>)
        -> Result<Vec<Predicate>, StorageError>
    {
        let field = QueryField::Genotype;
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(field.name(), value, "mixed , and ;")
        })?;

        let mut entries: Vec<(i32, Vec<&str>)> = Vec::new();
        for part in parts {
            match part.split_once(':') {
                Some((sample_name, genotype)) => {
                    let sample_id = self.metadata.sample_id(study, sample_name)?;
                    self.check_sample_release(study, sample_id, release)?;
                    entries.push((sample_id, vec![genotype]));
                }
                None => {
                    let Some((_, genotypes)) = entries.last_mut() else {
                        return Err(StorageError::malformed(
                            field.name(), part, "expected sample:genotypes",
                        ));
                    };
                    genotypes.push(part);
                }
            }
        }

        let defaults = self.metadata.default_genotypes(study)?;
        let mut narrow = op == ListOperator::And || entries.len() == 1;
        let mut per_sample = Vec::new();
        for (sample_id, genotypes) in &entries {
            let mut alternatives = Vec::new();
            for genotype in genotypes {
                let (negated, genotype) = utils::strip_negation(genotype);
                // Negated and default genotypes match by absence, which a
                // file condition cannot narrow.
                if negated || defaults.iter().any(|d| d == genotype) {
                    narrow = false;
                }
                alternatives.push(self.genotype_condition(study, *sample_id, genotype, negated)?);
            }
            per_sample.push(Predicate::or(alternatives));
        }

        let mut result = vec![match op {
            ListOperator::Or => Predicate::or(per_sample),
            ListOperator::And => Predicate::and(per_sample),
        }];
        if narrow {
            let sample_ids: Vec<i32> = entries.iter().map(|(id, _)| *id).collect();
            if let Some(condition) = self.candidate_file_filter(study, &sample_ids)? {
                result.push(condition);
            }
        }
        Ok(result)
    }

    /// One genotype condition for one sample.
    ///
    /// Default genotypes are not stored, so asking for one means the sample
    /// appears in no stored group; the condition enumerates the loaded
    /// genotypes and requires absence from each.
    fn genotype_condition(
        &self, study: i32, sample_id: i32, genotype: &str, negated: bool,
    ) -> Result<Predicate, StorageError> {
        let defaults = self.metadata.default_genotypes(study)?;
        let is_default = defaults.iter().any(|d| d == genotype);
        let gt_path = |gt: &str| files_path(
            &format!("{}.{}", schema::GENOTYPES, sample::genotype_to_storage(gt))
        );

        if is_default {
            let mut others: Vec<String> = self.metadata.loaded_genotypes(study)?
                .into_iter()
                .filter(|gt| !defaults.iter().any(|d| d == gt))
                .collect();
            if !others.iter().any(|gt| gt == UNKNOWN_GENOTYPE) {
                others.push(UNKNOWN_GENOTYPE.to_string());
            }
            let conds: Vec<Predicate> = others.iter().map(|gt| {
                if negated {
                    Predicate::eq(&gt_path(gt), sample_id as i64)
                } else {
                    Predicate::cmp(&gt_path(gt), CmpOp::Ne, sample_id as i64)
                }
            }).collect();
            Ok(if negated { Predicate::or(conds) } else { Predicate::and(conds) })
        } else {
            let condition = if negated {
                Predicate::cmp(&gt_path(genotype), CmpOp::Ne, sample_id as i64)
            } else {
                Predicate::eq(&gt_path(genotype), sample_id as i64)
            };
            Ok(condition)
        }
    }

    /// Genotypes implied by a bare sample filter.
    const MAIN_GENOTYPES: [&'static str; 9] =
        ["1", "0/1", "0|1", "1|0", "1/1", "1|1", "1/2", "1|2", "2|1"];

    /// Sample filter: the sample carries some main genotype.
    fn compile_samples(&self, study: i32, value: &str, release: Option<i32>)
        -> Result<Vec<Predicate>, StorageError>
    {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(QueryField::Sample.name(), value, "mixed , and ;")
        })?;
        let mut sample_ids = Vec::new();
        for part in parts {
            let (negated, name) = utils::strip_negation(part);
            if negated {
                return Err(StorageError::malformed(
                    QueryField::Sample.name(), part, "negation is not supported here",
                ));
            }
            let id = self.metadata.sample_id(study, name)?;
            self.check_sample_release(study, id, release)?;
            sample_ids.push(id);
        }

        let per_sample: Vec<Predicate> = sample_ids.iter().map(|id| {
            let alternatives: Vec<Predicate> = Self::MAIN_GENOTYPES.iter().map(|gt| {
                Predicate::eq(
                    &files_path(&format!("{}.{}", schema::GENOTYPES, gt)),
                    *id as i64,
                )
            }).collect();
            Predicate::or(alternatives)
        }).collect();

        let mut result = vec![match op {
            ListOperator::Or => Predicate::or(per_sample),
            ListOperator::And => Predicate::and(per_sample),
        }];
        if let Some(condition) = self.candidate_file_filter(study, &sample_ids)? {
            result.push(condition);
        }
        Ok(result)
    }

    /// Narrows to the files owning the samples, when each sample maps to
    /// one file and the union does not already cover every indexed file.
    fn candidate_file_filter(&self, study: i32, sample_ids: &[i32])
        -> Result<Option<Predicate>, StorageError>
    {
        let mut candidate_files: Vec<i32> = Vec::new();
        for id in sample_ids {
            let files = self.metadata.files_of_sample(study, *id)?;
            if files.len() > 1 {
                return Ok(None);
            }
            for file in files {
                if !candidate_files.contains(&file) {
                    candidate_files.push(file);
                }
            }
        }
        let indexed = self.metadata.indexed_files(study)?;
        if candidate_files.is_empty() || candidate_files.len() >= indexed.len() {
            return Ok(None);
        }
        candidate_files.sort_unstable();
        Ok(Some(Predicate::is_in(
            &files_path(schema::FILE_ID),
            candidate_files.into_iter().map(|id| Value::from(id as i64)).collect(),
        )))
    }

    fn compile_cohort(&self, default_study: i32, value: &str) -> Result<Predicate, StorageError> {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(QueryField::Cohort.name(), value, "mixed , and ;")
        })?;
        let mut conds = Vec::new();
        for part in parts {
            let (negated, name) = utils::strip_negation(part);
            if negated && op == ListOperator::Or {
                return Err(StorageError::malformed(
                    QueryField::Cohort.name(), part, "negation is not allowed in a disjunction",
                ));
            }
            let (study, cohort) = match name.split_once(':') {
                Some((study_name, cohort)) => (self.metadata.study_id(study_name)?, cohort),
                None => (default_study, name),
            };
            let cohort_id = self.metadata.cohort_id(study, cohort)?;
            let condition = Predicate::elem_match(schema::STATS, Predicate::and(vec![
                Predicate::eq(schema::STUDY_ID, study as i64),
                Predicate::eq(schema::COHORT_ID, cohort_id as i64),
            ]));
            conds.push(if negated { Predicate::Not(Box::new(condition)) } else { condition });
        }
        Ok(match op {
            ListOperator::Or => Predicate::or(conds),
            ListOperator::And => Predicate::and(conds),
        })
    }

    //-------------------------------------------------------------------------

    /// Cohort statistics filters: maf, mgf and missingness counts.
    fn compile_stats_filters(&self, query: &VariantQuery)
        -> Result<Option<Predicate>, StorageError>
    {
        let mut parts = Vec::new();
        for (field, stored) in [
            (QueryField::StatsMaf, schema::MAF),
            (QueryField::StatsMgf, schema::MGF),
            (QueryField::MissingAlleles, schema::MISSING_ALLELES),
            (QueryField::MissingGenotypes, schema::MISSING_GENOTYPES),
        ] {
            if let Some(value) = query.get(field) {
                parts.push(self.compile_stats_values(field, value, stored)?);
            }
        }
        if parts.is_empty() { Ok(None) } else { Ok(Some(Predicate::and(parts))) }
    }

    /// One stats filter, `[{study}:]{cohort}{op}{value}` values in a list.
    fn compile_stats_values(&self, field: QueryField, value: &str, stored: &str)
        -> Result<Predicate, StorageError>
    {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(field.name(), value, "mixed , and ;")
        })?;
        let mut conds = Vec::new();
        for part in parts {
            let (target, filter_op, number) = split_operator(part).ok_or_else(|| {
                StorageError::malformed(field.name(), part, "expected [study:]cohort{op}{value}")
            })?;
            let number: f64 = number.parse().map_err(|_| {
                StorageError::malformed(field.name(), part, "expected a number")
            })?;
            let cmp = filter_op.cmp_op().ok_or_else(|| {
                StorageError::malformed(field.name(), part, "regex is not valid here")
            })?;
            let (study, cohort) = match target.split_once(':') {
                Some((study_name, cohort)) => (self.metadata.study_id(study_name)?, cohort),
                None => {
                    let studies = self.metadata.studies();
                    match studies.as_slice() {
                        [only] => (*only, target),
                        _ => return Err(StorageError::malformed(
                            field.name(), part, "the stats filter needs a study prefix",
                        )),
                    }
                }
            };
            let cohort_id = self.metadata.cohort_id(study, cohort)?;

            let scope = Predicate::and(vec![
                Predicate::eq(schema::STUDY_ID, study as i64),
                Predicate::eq(schema::COHORT_ID, cohort_id as i64),
            ]);
            let full = Predicate::elem_match(schema::STATS, Predicate::and(vec![
                scope.clone(),
                Predicate::cmp(stored, cmp, number),
            ]));
            let condition = if filter_op.is_soft() {
                // Soft operators also match variants with no stats for the cohort.
                Predicate::or(vec![
                    Predicate::Not(Box::new(Predicate::elem_match(schema::STATS, scope))),
                    full,
                ])
            } else {
                full
            };
            conds.push(condition);
        }
        Ok(match op {
            ListOperator::Or => Predicate::or(conds),
            ListOperator::And => Predicate::and(conds),
        })
    }

    //-------------------------------------------------------------------------

    /// Protein substitution scores, numeric or by description.
    fn compile_protein_substitution(&self, value: &str) -> Result<Predicate, StorageError> {
        let field = QueryField::ProteinSubstitution;
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(field.name(), value, "mixed , and ;")
        })?;
        let mut conds = Vec::new();
        for part in parts {
            let (source, filter_op, raw) = split_operator(part).ok_or_else(|| {
                StorageError::malformed(field.name(), part, "expected {source}{op}{value}")
            })?;
            if filter_op.is_soft() {
                return Err(StorageError::unsupported(field.name()));
            }
            let source_field = match source {
                "sift" => schema::SIFT,
                "polyphen" => schema::POLYPHEN,
                _ => return Err(StorageError::malformed(field.name(), part, "unknown score source")),
            };
            let condition = match raw.parse::<f64>() {
                Ok(number) => {
                    let cmp = filter_op.cmp_op().ok_or_else(|| {
                        StorageError::malformed(field.name(), part, "regex is not valid here")
                    })?;
                    Predicate::cmp(&ct_path(&format!("{}.sc", source_field)), cmp, number)
                }
                Err(_) => {
                    // Non-numeric values compare against the description.
                    match filter_op {
                        FilterOp::Eq => Predicate::eq(
                            &ct_path(&format!("{}.ds", source_field)), raw,
                        ),
                        FilterOp::Ne => Predicate::cmp(
                            &ct_path(&format!("{}.ds", source_field)), CmpOp::Ne, raw,
                        ),
                        FilterOp::Matches => {
                            validate_pattern(field, raw)?;
                            Predicate::Regex {
                                path: ct_path(&format!("{}.ds", source_field)),
                                pattern: raw.to_string(),
                            }
                        }
                        _ => return Err(StorageError::malformed(
                            field.name(), part, "text values only compare with = or !=",
                        )),
                    }
                }
            };
            conds.push(condition);
        }
        Ok(match op {
            ListOperator::Or => Predicate::or(conds),
            ListOperator::And => Predicate::and(conds),
        })
    }

    /// Score filters stored as `{src, sc}` lists: conservation and
    /// functional scores.
    fn compile_score_list(
        &self, field: QueryField, value: &str, stored: &str, sources: &[&str],
    ) -> Result<Predicate, StorageError> {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(field.name(), value, "mixed , and ;")
        })?;
        let mut conds = Vec::new();
        for part in parts {
            let (source, filter_op, raw) = split_operator(part).ok_or_else(|| {
                StorageError::malformed(field.name(), part, "expected {source}{op}{value}")
            })?;
            if filter_op.is_soft() {
                return Err(StorageError::unsupported(field.name()));
            }
            if !sources.contains(&source) {
                return Err(StorageError::malformed(field.name(), part, "unknown score source"));
            }
            let number: f64 = raw.parse().map_err(|_| {
                StorageError::malformed(field.name(), part, "expected a number")
            })?;
            let cmp = filter_op.cmp_op().ok_or_else(|| {
                StorageError::malformed(field.name(), part, "regex is not valid here")
            })?;
            conds.push(Predicate::elem_match(&annot_path(stored), Predicate::and(vec![
                Predicate::eq("src", source),
                Predicate::cmp("sc", cmp, number),
            ])));
        }
        Ok(match op {
            ListOperator::Or => Predicate::or(conds),
            ListOperator::And => Predicate::and(conds),
        })
    }

    /// Population frequency filter, `{study}:{population}{op}{value}`.
    ///
    /// Upper bounds on the alternate frequency and lower bounds on the
    /// reference frequency also match variants with no entry for the
    /// population, since absence means the variant was not observed there.
    /// Soft operators force the absence branch for either bound direction.
    fn compile_population_frequency(
        &self, field: QueryField, value: &str, freq_field: &str,
    ) -> Result<Predicate, StorageError> {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(field.name(), value, "mixed , and ;")
        })?;
        let mut conds = Vec::new();
        for part in parts {
            let (target, filter_op, raw) = split_operator(part).ok_or_else(|| {
                StorageError::malformed(field.name(), part, "expected study:population{op}{value}")
            })?;
            let (study, population) = target.split_once(':').ok_or_else(|| {
                StorageError::malformed(field.name(), part, "expected study:population{op}{value}")
            })?;
            let number: f64 = raw.parse().map_err(|_| {
                StorageError::malformed(field.name(), part, "expected a number")
            })?;
            let cmp = filter_op.cmp_op().ok_or_else(|| {
                StorageError::malformed(field.name(), part, "regex is not valid here")
            })?;

            let path = annot_path(schema::POPULATION_FREQ);
            let scope = Predicate::and(vec![
                Predicate::eq("st", study),
                Predicate::eq("pop", population),
            ]);
            let full = Predicate::elem_match(&path, Predicate::and(vec![
                scope.clone(),
                Predicate::cmp(freq_field, cmp, number),
            ]));

            let include_missing = filter_op.is_soft() || match freq_field {
                "altF" => matches!(cmp, CmpOp::Lt | CmpOp::Lte),
                _ => matches!(cmp, CmpOp::Gt | CmpOp::Gte),
            };
            let condition = if include_missing {
                Predicate::or(vec![
                    Predicate::Exists { path: path.clone(), exists: false },
                    Predicate::Not(Box::new(Predicate::elem_match(&path, scope))),
                    full,
                ])
            } else {
                full
            };
            conds.push(condition);
        }
        Ok(match op {
            ListOperator::Or => Predicate::or(conds),
            ListOperator::And => Predicate::and(conds),
        })
    }

    //-------------------------------------------------------------------------

    /// Splits a list value, rejecting conjunctions for fields that only
    /// accept alternatives.
    fn or_list<'v>(&self, field: QueryField, value: &'v str)
        -> Result<(ListOperator, Vec<&'v str>), StorageError>
    {
        let (op, parts) = utils::split_list(value).ok_or_else(|| {
            StorageError::malformed(field.name(), value, "mixed , and ;")
        })?;
        for part in &parts {
            if part.starts_with('!') {
                return Err(StorageError::malformed(
                    field.name(), part, "negation is not supported here",
                ));
            }
            if part.is_empty() {
                return Err(StorageError::malformed(field.name(), value, "empty value in a list"));
            }
        }
        Ok((op, parts))
    }

    fn optional_or_list(&self, query: &VariantQuery, field: QueryField)
        -> Result<Option<Vec<String>>, StorageError>
    {
        match query.get(field) {
            Some(value) => {
                let (_, parts) = self.or_list(field, value)?;
                Ok(Some(parts.into_iter().map(String::from).collect()))
            }
            None => Ok(None),
        }
    }
}

//-----------------------------------------------------------------------------

/// Parses `SO:0001583`-style or numeric Sequence Ontology accessions.
fn parse_so_accession(value: &str) -> Result<u32, StorageError> {
    let digits = value.strip_prefix("SO:").unwrap_or(value);
    digits.parse::<u32>().map_err(|_| {
        StorageError::malformed(
            QueryField::ConsequenceType.name(), value,
            "expected SO:NNNNNNN or a numeric accession",
        )
    })
}

fn is_plain_token(value: &str) -> bool {
    value == "." || (!value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

fn validate_pattern(field: QueryField, pattern: &str) -> Result<(), StorageError> {
    Regex::new(pattern).map(|_| ()).map_err(|e| {
        StorageError::malformed(field.name(), pattern, format!("invalid pattern: {}", e))
    })
}

//-----------------------------------------------------------------------------
