use super::*;

use crate::document::Document;
use crate::metadata::StudyRegistry;
use crate::predicate::{CmpOp, Predicate};

//-----------------------------------------------------------------------------

fn demo_registry() -> (StudyRegistry, i32) {
    let mut registry = StudyRegistry::new();
    let study = registry.add_study("demo");
    let s1 = registry.add_sample(study, "S1");
    let s2 = registry.add_sample(study, "S2");
    let s3 = registry.add_sample(study, "S3");
    let f1 = registry.add_file(study, "a.vcf", vec![s1, s2]);
    let f2 = registry.add_file(study, "b.vcf", vec![s3]);
    registry.index_file(study, f1);
    registry.index_file(study, f2);
    registry.add_cohort(study, "ALL");
    registry.set_loaded_genotypes(study, vec![
        String::from("0/0"), String::from("0/1"), String::from("1/1"),
    ]);
    (registry, study)
}

fn compile(registry: &StudyRegistry, query: &VariantQuery) -> Predicate {
    let compiler = QueryCompiler::new(registry);
    match compiler.compile(query) {
        Ok(predicate) => predicate,
        Err(err) => panic!("Compilation failed: {}", err),
    }
}

fn compile_err(registry: &StudyRegistry, query: &VariantQuery) -> StorageError {
    let compiler = QueryCompiler::new(registry);
    match compiler.compile(query) {
        Ok(predicate) => panic!("Compilation should have failed, got {:?}", predicate),
        Err(err) => err,
    }
}

//-----------------------------------------------------------------------------

#[test]
fn region_parsing() {
    let full = Region::parse("chr22:16050000-16060000");
    assert_eq!(full, Some(Region {
        chromosome: String::from("22"),
        start: Some(16050000), end: Some(16060000),
    }), "Wrong full region");

    let bare = Region::parse("X");
    assert_eq!(bare, Some(Region {
        chromosome: String::from("X"), start: None, end: None,
    }), "Wrong bare chromosome region");

    let position = Region::parse("1:1,000");
    assert_eq!(position, Some(Region {
        chromosome: String::from("1"), start: Some(1000), end: Some(1000),
    }), "Wrong single-position region");

    assert!(Region::parse("1:200-100").is_none(), "Inverted region should not parse");
    assert!(Region::parse(":100").is_none(), "Empty chromosome should not parse");
    assert!(Region::parse("1:abc").is_none(), "Non-numeric position should not parse");
}

#[test]
fn region_key_range() {
    let region = Region::parse("22:100-200").unwrap();
    let (low, high) = region.key_range();
    assert!(low < high, "Empty key range");
    assert!(low.starts_with("22:"), "Wrong low bound {}", low);
    assert!(high.starts_with("22:"), "Wrong high bound {}", high);
}

#[test]
fn compilation_is_deterministic() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::Region, "22:100-200,X")
        .with(QueryField::VariantType, "SNV")
        .with(QueryField::Genotype, "S1:0/1");
    let first = compile(&registry, &query);
    let second = compile(&registry, &query);
    assert_eq!(first, second, "Compilation is not deterministic");
}

#[test]
fn empty_query_is_trivial() {
    let (registry, _) = demo_registry();
    let predicate = compile(&registry, &VariantQuery::new());
    assert_eq!(predicate, Predicate::True, "An empty query should compile to True");
}

//-----------------------------------------------------------------------------

#[test]
fn exact_variant_anchor() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::ExactVariant, "22:100:A:T,22:200:C:-");
    let predicate = compile(&registry, &query);
    assert_eq!(predicate, Predicate::is_in(schema::ID_STRING, vec![
        Value::from("22:100:A:T"), Value::from("22:200:C:-"),
    ]), "Wrong exact-variant predicate");

    let bad = VariantQuery::new().with(QueryField::ExactVariant, "not-a-variant");
    let err = compile_err(&registry, &bad);
    assert!(matches!(err, StorageError::MalformedFilter { .. }), "Wrong error: {:?}", err);
}

#[test]
fn id_filter_matches_both_id_fields() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Id, "rs123");
    let predicate = compile(&registry, &query);
    let expected = Predicate::or(vec![
        Predicate::is_in(schema::IDS, vec![Value::from("rs123")]),
        Predicate::is_in(schema::ID_STRING, vec![Value::from("rs123")]),
    ]);
    assert_eq!(predicate, expected, "Wrong id predicate");
}

#[test]
fn regions_combine_as_disjunction() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Region, "22:100-200,X");
    let predicate = compile(&registry, &query);
    let expected = Predicate::or(vec![
        Predicate::and(vec![
            Predicate::eq(schema::CHROMOSOME, "22"),
            Predicate::cmp(schema::START, CmpOp::Gte, 100_i64),
            Predicate::cmp(schema::START, CmpOp::Lte, 200_i64),
        ]),
        Predicate::eq(schema::CHROMOSOME, "X"),
    ]);
    assert_eq!(predicate, expected, "Wrong region predicate");
}

#[test]
fn type_filter_includes_subtypes() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::VariantType, "SNV");
    let predicate = compile(&registry, &query);
    let Predicate::In { path, values } = predicate else {
        panic!("Type filter should compile to In, got {:?}", predicate);
    };
    assert_eq!(path, schema::TYPE, "Wrong path");
    assert!(values.contains(&Value::from("SNV")), "SNV missing from {:?}", values);

    let bad = VariantQuery::new().with(QueryField::VariantType, "NOT_A_TYPE");
    assert!(matches!(compile_err(&registry, &bad), StorageError::MalformedFilter { .. }));
}

//-----------------------------------------------------------------------------

#[test]
fn gene_combination_with_all_parts() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::Gene, "BRCA2")
        .with(QueryField::Biotype, "protein_coding")
        .with(QueryField::ConsequenceType, "SO:0001583")
        .with(QueryField::TranscriptFlag, "basic");
    let predicate = compile(&registry, &query);
    let expected = Predicate::is_in(
        "annot.cmb",
        vec![Value::from("BRCA2_protein_coding_1583_basic")],
    );
    assert_eq!(predicate, expected, "Wrong fully constrained combination");
}

#[test]
fn gene_combination_partial_uses_pattern() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::Gene, "TP53")
        .with(QueryField::ConsequenceType, "1583");
    let predicate = compile(&registry, &query);
    let Predicate::Regex { path, pattern } = predicate else {
        panic!("Partial combination should compile to Regex, got {:?}", predicate);
    };
    assert_eq!(path, "annot.cmb", "Wrong path");
    assert!(pattern.starts_with("^TP53"), "Pattern not anchored to the gene: {}", pattern);
    assert!(pattern.contains("1583"), "Accession missing from the pattern: {}", pattern);
}

#[test]
fn gene_combination_joins_the_region_disjunction() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::Region, "22")
        .with(QueryField::Gene, "TP53")
        .with(QueryField::ConsequenceType, "1583");
    let predicate = compile(&registry, &query);
    let Predicate::And(parts) = &predicate else {
        panic!("Expected a conjunction, got {:?}", predicate);
    };
    assert_eq!(parts.len(), 2, "Wrong number of conjuncts");
    let Predicate::Or(members) = &parts[0] else {
        panic!("First conjunct should be the region disjunction, got {:?}", parts[0]);
    };
    assert_eq!(members.len(), 2, "The combination should be a member of the disjunction");
    assert!(matches!(members[1], Predicate::Regex { .. }), "Wrong combination member");
    let expected_ct = Predicate::is_in("annot.ct.so", vec![Value::from(1583_i64)]);
    assert_eq!(parts[1], expected_ct, "The plain consequence type should constrain the regions");
}

#[test]
fn region_match_keeps_consequence_types_on_other_genes() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::Region, "22")
        .with(QueryField::Gene, "TP53")
        .with(QueryField::ConsequenceType, "1583");
    let predicate = compile(&registry, &query);

    // In the region, with the consequence type on a different gene.
    let mut in_region = Document::new();
    in_region.set(schema::CHROMOSOME, "22");
    let mut ct = Document::new();
    ct.set(schema::SO_ACCESSIONS, vec![Value::from(1583_i64)]);
    let mut annot = Document::new();
    annot.set(schema::CONSEQUENCE_TYPES, vec![Value::from(ct)]);
    annot.set(schema::COMBINATIONS, vec![Value::from("BRCA1_protein_coding_1583")]);
    in_region.set(schema::ANNOTATION, annot.clone());
    assert!(predicate.matches(&in_region), "An in-region variant with the consequence type should match");

    // Outside the region, on the queried gene.
    let mut on_gene = Document::new();
    on_gene.set(schema::CHROMOSOME, "17");
    annot.set(schema::COMBINATIONS, vec![Value::from("TP53_protein_coding_1583")]);
    on_gene.set(schema::ANNOTATION, annot);
    assert!(predicate.matches(&on_gene), "A variant on the queried gene should match");

    // Outside the region and without the gene.
    let mut neither = Document::new();
    neither.set(schema::CHROMOSOME, "17");
    let mut other = Document::new();
    other.set(schema::COMBINATIONS, vec![Value::from("BRCA1_protein_coding_1583")]);
    neither.set(schema::ANNOTATION, other);
    assert!(!predicate.matches(&neither), "A variant outside the region and the gene should not match");
}

#[test]
fn consequence_type_without_gene() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::ConsequenceType, "SO:0001583,1627");
    let predicate = compile(&registry, &query);
    let expected = Predicate::is_in("annot.ct.so", vec![
        Value::from(1583_i64), Value::from(1627_i64),
    ]);
    assert_eq!(predicate, expected, "Wrong consequence type predicate");

    let bad = VariantQuery::new().with(QueryField::ConsequenceType, "SO:abc");
    assert!(matches!(compile_err(&registry, &bad), StorageError::MalformedFilter { .. }));
}

#[test]
fn consequence_type_conjunction() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::ConsequenceType, "1583;1627");
    let predicate = compile(&registry, &query);
    let expected = Predicate::All {
        path: "annot.ct.so".to_string(),
        values: vec![Value::from(1583_i64), Value::from(1627_i64)],
    };
    assert_eq!(predicate, expected, "Wrong conjunctive consequence type predicate");
}

#[test]
fn annotation_exists_filter() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::AnnotationExists, "false");
    let predicate = compile(&registry, &query);
    assert_eq!(predicate, Predicate::Exists {
        path: String::from("annot"), exists: false,
    }, "Wrong annotationExists predicate");

    let bad = VariantQuery::new().with(QueryField::AnnotationExists, "maybe");
    assert!(matches!(compile_err(&registry, &bad), StorageError::MalformedFilter { .. }));
}

#[test]
fn protein_substitution_numeric_and_text() {
    let (registry, _) = demo_registry();

    let numeric = VariantQuery::new().with(QueryField::ProteinSubstitution, "sift<0.2");
    let predicate = compile(&registry, &numeric);
    assert_eq!(predicate, Predicate::cmp("annot.ct.sift.sc", CmpOp::Lt, 0.2),
        "Wrong numeric sift predicate");

    let text = VariantQuery::new().with(QueryField::ProteinSubstitution, "polyphen=benign");
    let predicate = compile(&registry, &text);
    assert_eq!(predicate, Predicate::eq("annot.ct.polyphen.ds", "benign"),
        "Wrong text polyphen predicate");

    let bad = VariantQuery::new().with(QueryField::ProteinSubstitution, "polyphen<benign");
    assert!(matches!(compile_err(&registry, &bad), StorageError::MalformedFilter { .. }));
}

#[test]
fn conservation_scores() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Conservation, "gerp>2.0");
    let predicate = compile(&registry, &query);
    let expected = Predicate::elem_match("annot.consScores", Predicate::and(vec![
        Predicate::eq("src", "gerp"),
        Predicate::cmp("sc", CmpOp::Gt, 2.0),
    ]));
    assert_eq!(predicate, expected, "Wrong conservation predicate");

    let bad = VariantQuery::new().with(QueryField::Conservation, "nosuch>2.0");
    assert!(matches!(compile_err(&registry, &bad), StorageError::MalformedFilter { .. }));
}

#[test]
fn soft_operators_only_apply_to_frequency_filters() {
    let (registry, _) = demo_registry();
    let cases = [
        (QueryField::Conservation, "gerp<<2.0"),
        (QueryField::FunctionalScore, "cadd_raw>>1.0"),
        (QueryField::ProteinSubstitution, "sift<<=0.2"),
        (QueryField::Qual, "<<30"),
    ];
    for (field, value) in cases {
        let query = VariantQuery::new().with(field, value);
        let query = if field == QueryField::Qual {
            query.with(QueryField::File, "a.vcf")
        } else {
            query
        };
        let err = compile_err(&registry, &query);
        assert!(
            matches!(err, StorageError::UnsupportedFilter { .. }),
            "Wrong error for {}: {:?}", field.name(), err,
        );
    }
}

//-----------------------------------------------------------------------------

#[test]
fn population_frequency_upper_bound_matches_missing() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::PopulationAltFrequency, "1000G:EUR<0.01");
    let predicate = compile(&registry, &query);
    let Predicate::Or(branches) = &predicate else {
        panic!("An upper bound should include the absence branch, got {:?}", predicate);
    };
    assert_eq!(branches.len(), 3, "Wrong number of branches");
    assert!(matches!(branches[0], Predicate::Exists { exists: false, .. }),
        "First branch should match missing annotation");
}

#[test]
fn population_frequency_lower_bound_is_strict() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::PopulationAltFrequency, "1000G:EUR>0.01");
    let predicate = compile(&registry, &query);
    assert!(matches!(predicate, Predicate::ElemMatch { .. }),
        "A lower bound on altF should not match missing entries, got {:?}", predicate);
}

#[test]
fn population_frequency_soft_operator_forces_missing_branch() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::PopulationAltFrequency, "1000G:EUR>>0.01");
    let predicate = compile(&registry, &query);
    assert!(matches!(predicate, Predicate::Or(_)),
        "A soft lower bound should include the absence branch, got {:?}", predicate);
}

//-----------------------------------------------------------------------------

#[test]
fn study_filter_conjunction_with_negation() {
    let mut registry = StudyRegistry::new();
    let s1 = registry.add_study("first");
    let s2 = registry.add_study("second");
    let query = VariantQuery::new().with(QueryField::Study, "first;!second");
    let predicate = compile(&registry, &query);
    let expected = Predicate::and(vec![
        Predicate::eq("studies.sid", s1 as i64),
        Predicate::NotIn {
            path: String::from("studies.sid"),
            values: vec![Value::from(s2 as i64)],
        },
    ]);
    assert_eq!(predicate, expected, "Wrong study predicate");

    let bad = VariantQuery::new().with(QueryField::Study, "first,!second");
    assert!(matches!(compile_err(&registry, &bad), StorageError::MalformedFilter { .. }),
        "Negation in a disjunction should be rejected");
}

#[test]
fn unknown_study_is_not_found() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Study, "nonexistent");
    let err = compile_err(&registry, &query);
    assert!(matches!(err, StorageError::NotFound { .. }), "Wrong error: {:?}", err);
}

#[test]
fn genotype_filter_binds_to_the_study() {
    let (registry, study) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Genotype, "S1:0/1");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { path, inner } = &predicate else {
        panic!("Study-scoped filters should compile to ElemMatch, got {:?}", predicate);
    };
    assert_eq!(path, schema::STUDIES, "Wrong scope path");
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction inside the scope, got {:?}", inner);
    };
    assert_eq!(parts[0], Predicate::eq(schema::STUDY_ID, study as i64), "Wrong study binding");
    assert_eq!(parts[1], Predicate::eq("files.gt.0/1", 1_i64), "Wrong genotype condition");
}

#[test]
fn genotype_comma_list_is_a_disjunction_over_samples() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Genotype, "S1:0/1,S3:1/1");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    let expected = Predicate::or(vec![
        Predicate::eq("files.gt.0/1", 1_i64),
        Predicate::eq("files.gt.1/1", 3_i64),
    ]);
    assert_eq!(parts[1], expected, "Each comma part should bind its own sample");
}

#[test]
fn genotype_bare_part_extends_the_previous_sample() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Genotype, "S1:0/1,1/1");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    let expected = Predicate::or(vec![
        Predicate::eq("files.gt.0/1", 1_i64),
        Predicate::eq("files.gt.1/1", 1_i64),
    ]);
    assert_eq!(parts[1], expected, "Wrong genotype alternatives");

    let bad = VariantQuery::new().with(QueryField::Genotype, "0/1,S1:1/1");
    assert!(matches!(compile_err(&registry, &bad), StorageError::MalformedFilter { .. }));
}

#[test]
fn genotype_filter_narrows_to_the_owning_file() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Genotype, "S3:1/1");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    assert_eq!(parts.len(), 3, "Wrong number of scoped conditions");
    let expected = Predicate::is_in("files.fid", vec![Value::from(2_i64)]);
    assert_eq!(parts[2], expected, "Wrong candidate file condition");

    // A negated genotype matches by absence, so no file can be required.
    let negated = VariantQuery::new().with(QueryField::Genotype, "S3:!1/1");
    let predicate = compile(&registry, &negated);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    assert_eq!(parts.len(), 2, "A negated genotype should not narrow the files");
}

#[test]
fn default_genotype_enumerates_the_others() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Genotype, "S1:0/0");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    // Absent from every stored non-default group, including the unknown one.
    let expected = Predicate::and(vec![
        Predicate::cmp("files.gt.0/1", CmpOp::Ne, 1_i64),
        Predicate::cmp("files.gt.1/1", CmpOp::Ne, 1_i64),
        Predicate::cmp("files.gt.?/?", CmpOp::Ne, 1_i64),
    ]);
    assert_eq!(parts[1], expected, "Wrong default-genotype condition");
}

#[test]
fn negated_default_genotype_is_a_disjunction() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Genotype, "S1:!0/0");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    let expected = Predicate::or(vec![
        Predicate::eq("files.gt.0/1", 1_i64),
        Predicate::eq("files.gt.1/1", 1_i64),
        Predicate::eq("files.gt.?/?", 1_i64),
    ]);
    assert_eq!(parts[1], expected, "Wrong negated default-genotype condition");
}

#[test]
fn unknown_genotype_uses_storage_form() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Genotype, "S1:./.");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    assert_eq!(parts[1], Predicate::eq("files.gt.-1/-1", 1_i64),
        "Missing alleles should be stored as -1");
}

#[test]
fn sample_filter_implies_main_genotypes() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Sample, "S3");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    let Predicate::Or(alternatives) = &parts[1] else {
        panic!("Expected a genotype disjunction, got {:?}", parts[1]);
    };
    assert_eq!(alternatives.len(), QueryCompiler::MAIN_GENOTYPES.len(),
        "Wrong number of implied genotypes");
    // S3 is only in b.vcf, which does not cover both indexed files.
    assert_eq!(parts[2], Predicate::is_in("files.fid", vec![Value::from(2_i64)]),
        "The candidate files should be narrowed");
}

#[test]
fn sample_filter_needs_a_single_study() {
    let mut registry = StudyRegistry::new();
    let s1 = registry.add_study("first");
    registry.add_study("second");
    registry.add_sample(s1, "S1");

    let query = VariantQuery::new().with(QueryField::Sample, "S1");
    assert!(matches!(compile_err(&registry, &query), StorageError::MalformedFilter { .. }),
        "An ambiguous study should be rejected");

    let scoped = query.clone().with(QueryField::Study, "first");
    let compiler = QueryCompiler::new(&registry);
    assert!(compiler.compile(&scoped).is_ok(), "A study filter should disambiguate");
}

#[test]
fn file_filter_binds_filter_and_qual_per_file() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new()
        .with(QueryField::File, "a.vcf")
        .with(QueryField::Filter, "PASS")
        .with(QueryField::Qual, ">30");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    let Predicate::ElemMatch { path, inner: file_cond } = &parts[1] else {
        panic!("Expected a file ElemMatch, got {:?}", parts[1]);
    };
    assert_eq!(path, schema::FILES, "Wrong file scope path");
    let Predicate::And(file_parts) = file_cond.as_ref() else {
        panic!("Expected a conjunction per file, got {:?}", file_cond);
    };
    assert_eq!(file_parts.len(), 3, "File id, FILTER and QUAL should bind together");
    assert_eq!(file_parts[2], Predicate::cmp("attrs.QUAL", CmpOp::Gt, 30.0),
        "Wrong QUAL condition");
}

#[test]
fn filter_status_matches_on_token_boundaries() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Filter, "PASS");
    let predicate = compile(&registry, &query);
    let Predicate::ElemMatch { inner, .. } = &predicate else {
        panic!("Expected ElemMatch, got {:?}", predicate);
    };
    let Predicate::And(parts) = inner.as_ref() else {
        panic!("Expected a conjunction, got {:?}", inner);
    };
    let Predicate::Regex { pattern, .. } = &parts[1] else {
        panic!("Expected a regex condition, got {:?}", parts[1]);
    };
    assert_eq!(pattern, "(?:^|;)PASS(?:;|$)", "Wrong FILTER pattern");
    let regex = Regex::new(pattern).unwrap();
    assert!(regex.is_match("PASS"), "Should match the whole value");
    assert!(regex.is_match("q10;PASS"), "Should match a packed value");
    assert!(!regex.is_match("PASSED"), "Should not match a longer token");
}

#[test]
fn release_filter_rejects_later_samples() {
    let (mut registry, study) = demo_registry();
    let s1 = registry.sample_id(study, "S1").unwrap();
    registry.set_sample_release(study, s1, 3);

    let query = VariantQuery::new()
        .with(QueryField::Genotype, "S1:0/1")
        .with(QueryField::Release, "2");
    let err = compile_err(&registry, &query);
    let StorageError::StaleReference { release, .. } = err else {
        panic!("Wrong error: {:?}", err);
    };
    assert_eq!(release, 3, "Wrong reported release");

    let visible = VariantQuery::new()
        .with(QueryField::Genotype, "S1:0/1")
        .with(QueryField::Release, "3");
    let compiler = QueryCompiler::new(&registry);
    assert!(compiler.compile(&visible).is_ok(), "The sample is visible at its own release");
}

#[test]
fn release_filter_adds_an_upper_bound() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Release, "2");
    let predicate = compile(&registry, &query);
    assert_eq!(predicate, Predicate::cmp(schema::RELEASE, CmpOp::Lte, 2_i64),
        "Wrong release predicate");
}

//-----------------------------------------------------------------------------

#[test]
fn stats_filter_with_explicit_study() {
    let (registry, study) = demo_registry();
    let query = VariantQuery::new().with(QueryField::StatsMaf, "demo:ALL<0.05");
    let predicate = compile(&registry, &query);
    let expected = Predicate::elem_match(schema::STATS, Predicate::and(vec![
        Predicate::eq(schema::STUDY_ID, study as i64),
        Predicate::eq(schema::COHORT_ID, 1_i64),
        Predicate::cmp(schema::MAF, CmpOp::Lt, 0.05),
    ]));
    assert_eq!(predicate, expected, "Wrong stats predicate");
}

#[test]
fn stats_filter_defaults_to_the_only_study() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::StatsMaf, "ALL<0.05");
    let compiler = QueryCompiler::new(&registry);
    assert!(compiler.compile(&query).is_ok(), "A single study should not need a prefix");

    let mut two = StudyRegistry::new();
    two.add_study("first");
    two.add_study("second");
    assert!(matches!(compile_err(&two, &query), StorageError::MalformedFilter { .. }),
        "Two studies should require a prefix");
}

#[test]
fn soft_stats_operator_matches_missing_stats() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::StatsMaf, "demo:ALL<<0.05");
    let predicate = compile(&registry, &query);
    let Predicate::Or(branches) = &predicate else {
        panic!("A soft operator should include the absence branch, got {:?}", predicate);
    };
    assert_eq!(branches.len(), 2, "Wrong number of branches");
    assert!(matches!(branches[0], Predicate::Not(_)), "First branch should match missing stats");
}

#[test]
fn cohort_filter_requires_computed_stats() {
    let (registry, study) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Cohort, "ALL");
    let predicate = compile(&registry, &query);
    let Predicate::And(parts) = &predicate else {
        panic!("Expected a conjunction, got {:?}", predicate);
    };
    let expected = Predicate::elem_match(schema::STATS, Predicate::and(vec![
        Predicate::eq(schema::STUDY_ID, study as i64),
        Predicate::eq(schema::COHORT_ID, 1_i64),
    ]));
    assert_eq!(parts[0], expected, "Wrong cohort predicate");
}

//-----------------------------------------------------------------------------

#[test]
fn mixed_separators_are_rejected() {
    let (registry, _) = demo_registry();
    let query = VariantQuery::new().with(QueryField::Region, "22:100-200,X;1");
    assert!(matches!(compile_err(&registry, &query), StorageError::MalformedFilter { .. }),
        "Mixed separators should be rejected");
}

#[test]
fn key_ranges_from_regions() {
    let (registry, _) = demo_registry();
    let compiler = QueryCompiler::new(&registry);
    let query = VariantQuery::new().with(QueryField::Region, "22:100-200,X");
    let ranges = compiler.key_ranges(&query);
    assert_eq!(ranges.len(), 2, "Wrong number of key ranges");
    assert!(ranges.iter().all(|(low, high)| low < high), "Empty key range");

    assert!(compiler.key_ranges(&VariantQuery::new()).is_empty(),
        "No ranges without a region filter");
}

#[test]
fn projection_sections() {
    let (registry, _) = demo_registry();
    let compiler = QueryCompiler::new(&registry);

    let full = compiler.compile_projection(&Projection::everything());
    assert!(full.contains(&schema::STUDIES), "Full projection should keep studies");
    assert!(full.contains(&schema::ANNOTATION), "Full projection should keep annotation");

    let mut slim = Projection::everything();
    slim.exclude_annotation = true;
    slim.exclude_studies = true;
    let sections = compiler.compile_projection(&slim);
    assert!(!sections.contains(&schema::STUDIES), "Studies should be excluded");
    assert!(!sections.contains(&schema::ANNOTATION), "Annotation should be excluded");
    assert!(sections.contains(&schema::CHROMOSOME), "Core fields are always kept");
}

//-----------------------------------------------------------------------------
