use super::*;

use crate::predicate::CmpOp;
use crate::variant::{FileRecord, StudyRecord, Variant, VariantStats};

use tempfile::TempDir;

//-----------------------------------------------------------------------------

fn temp_db(name: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(format!("{}.db", name));
    (dir, path)
}

fn variant_with_study(chromosome: &str, start: i64, study: i32, files: &[i32]) -> Variant {
    let mut variant = Variant::new(chromosome, start, "A", "T");
    let mut record = StudyRecord::new(study);
    for file_id in files {
        let mut file = FileRecord::new(*file_id);
        file.genotypes.insert(String::from("0/1"), vec![*file_id * 10 + 1]);
        file.genotypes.insert(String::from("1/1"), vec![*file_id * 10 + 2]);
        record.files.push(file);
    }
    variant.studies.push(record);
    variant
}

fn test_variants() -> Vec<Variant> {
    vec![
        variant_with_study("1", 100, 1, &[1]),
        variant_with_study("1", 200, 1, &[1, 2]),
        variant_with_study("2", 100, 1, &[2]),
        variant_with_study("10", 500, 2, &[1]),
    ]
}

//-----------------------------------------------------------------------------

#[test]
fn create_open_and_tags() {
    let (_dir, path) = temp_db("create-open");
    {
        let mut database = VariantBase::create(&path).unwrap();
        assert_eq!(database.version(), VariantBase::VERSION, "Wrong version after create");
        database.set_tag("stats_sync", "true").unwrap();
    }

    let database = VariantBase::open(&path).unwrap();
    assert_eq!(database.version(), VariantBase::VERSION, "Wrong version after open");
    assert_eq!(database.get_tag("stats_sync").unwrap(), Some(String::from("true")),
        "Wrong tag value");
    assert_eq!(database.get_tag("nonexistent").unwrap(), None,
        "Missing tags should not have values");
    assert_eq!(database.variant_count().unwrap(), 0, "A new database should be empty");

    assert!(is_variant_base(&path), "The file should identify as a variant-base database");

    let result = VariantBase::create(&path);
    assert!(result.is_err(), "Creating over an existing database should fail");
}

#[test]
fn missing_database_is_not_identified() {
    let (_dir, path) = temp_db("missing");
    assert!(!is_variant_base(&path), "A missing file is not a database");
    let result = VariantBase::open(&path);
    assert!(result.is_err(), "Opening a missing database should fail");
}

//-----------------------------------------------------------------------------

#[test]
fn insert_and_count() {
    let (_dir, path) = temp_db("insert");
    let mut database = VariantBase::create(&path).unwrap();
    let variants = test_variants();
    let inserted = database.insert(&variants).unwrap();
    assert_eq!(inserted, variants.len(), "Wrong number of inserted variants");
    assert_eq!(database.variant_count().unwrap(), variants.len(), "Wrong variant count");

    // Reinserting replaces the existing rows.
    let inserted = database.insert(&variants[..2]).unwrap();
    assert_eq!(inserted, 2, "Wrong number of reinserted variants");
    assert_eq!(database.variant_count().unwrap(), variants.len(),
        "Reinsertion should not create new rows");
}

#[test]
fn find_returns_variants_in_key_order() {
    let (_dir, path) = temp_db("find-order");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    let found = database.find(&Predicate::True, &[], &FindOptions::default()).unwrap();
    assert_eq!(found.len(), 4, "Wrong number of results");
    let positions: Vec<(String, i64)> = found.iter()
        .map(|v| (v.chromosome.clone(), v.start))
        .collect();
    // Single-character chromosomes sort before two-character ones.
    assert_eq!(positions, vec![
        (String::from("1"), 100),
        (String::from("1"), 200),
        (String::from("2"), 100),
        (String::from("10"), 500),
    ], "Wrong result order");
}

#[test]
fn find_with_predicate_and_limit() {
    let (_dir, path) = temp_db("find-filter");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    let on_chr1 = Predicate::eq(schema::CHROMOSOME, "1");
    let found = database.find(&on_chr1, &[], &FindOptions::default()).unwrap();
    assert_eq!(found.len(), 2, "Wrong number of filtered results");

    let options = FindOptions { limit: Some(1), ..FindOptions::default() };
    let found = database.find(&on_chr1, &[], &options).unwrap();
    assert_eq!(found.len(), 1, "The limit should cap the results");

    assert_eq!(database.count(&on_chr1, &[]).unwrap(), 2, "Wrong count");
}

#[test]
fn find_with_key_ranges() {
    let (_dir, path) = temp_db("find-ranges");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    let ranges = vec![(
        VariantKey::prefix("1", 150),
        VariantKey::prefix("1", 251),
    )];
    let found = database.find(&Predicate::True, &ranges, &FindOptions::default()).unwrap();
    assert_eq!(found.len(), 1, "Wrong number of results in the range");
    assert_eq!(found[0].start, 200, "Wrong variant in the range");
}

//-----------------------------------------------------------------------------

#[test]
fn update_set_and_unset() {
    let (_dir, path) = temp_db("update-set");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    let on_chr1 = Predicate::eq(schema::CHROMOSOME, "1");
    let summary = database.update(&on_chr1, &[], &[
        Mutation::Set(String::from(schema::RELEASE), Value::from(3_i64)),
    ]).unwrap();
    assert_eq!(summary, UpdateSummary { matched: 2, modified: 2 }, "Wrong update summary");

    let found = database.find(&on_chr1, &[], &FindOptions::default()).unwrap();
    assert!(found.iter().all(|v| v.release == Some(3)), "The release was not set");

    // Setting the same value again changes nothing.
    let summary = database.update(&on_chr1, &[], &[
        Mutation::Set(String::from(schema::RELEASE), Value::from(3_i64)),
    ]).unwrap();
    assert_eq!(summary, UpdateSummary { matched: 2, modified: 0 },
        "An identical value should not count as a modification");
}

#[test]
fn update_pull_study() {
    let (_dir, path) = temp_db("pull-study");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    let summary = database.update(&Predicate::True, &[], &[
        Mutation::PullStudy(1),
    ]).unwrap();
    assert_eq!(summary.matched, 4, "Wrong matched count");
    assert_eq!(summary.modified, 3, "Only variants with study 1 should change");

    let found = database.find(&Predicate::True, &[], &FindOptions::default()).unwrap();
    for variant in &found {
        assert!(variant.studies.iter().all(|s| s.study_id != 1),
            "Study 1 should be gone from {}", variant.to_id_string());
    }
}

#[test]
fn update_pull_files_and_prune() {
    let (_dir, path) = temp_db("pull-files");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    let summary = database.update(&Predicate::True, &[], &[
        Mutation::PullFiles(1, vec![1]),
        Mutation::PruneEmptyStudies,
    ]).unwrap();
    assert_eq!(summary.matched, 4, "Wrong matched count");

    let found = database.find(&Predicate::True, &[], &FindOptions::default()).unwrap();
    for variant in &found {
        for study in &variant.studies {
            if study.study_id == 1 {
                assert!(study.files.iter().all(|f| f.absolute_id() != 1),
                    "File 1 should be gone from {}", variant.to_id_string());
                assert!(!study.files.is_empty(),
                    "Empty study entries should have been pruned");
            }
        }
    }
    // The variant at 1:100 only had file 1 in study 1; its entry is pruned.
    let at_100 = found.iter().find(|v| v.chromosome == "1" && v.start == 100).unwrap();
    assert!(at_100.studies.is_empty(), "The emptied study entry should be pruned");

    // Cohort stats of the pruned study must not be left behind.
    let mut with_stats = variant_with_study("3", 100, 1, &[1]);
    with_stats.studies[0].stats.push(VariantStats {
        study_id: 1, cohort_id: 1, maf: 0.25, ..VariantStats::default()
    });
    let codec = DocumentSchema;
    let (_, mut doc) = codec.encode(&with_stats);
    assert!(doc.get_array(schema::STATS).is_some(), "The stats should be stored");
    Mutation::PullFiles(1, vec![1]).apply(&mut doc);
    assert!(Mutation::PruneEmptyStudies.apply(&mut doc), "Pruning should report a change");
    assert!(doc.get_array(schema::STATS).map(|s| s.is_empty()).unwrap_or(true),
        "Stats of the pruned study should be gone");
}

#[test]
fn update_pull_samples_drops_empty_groups() {
    let (_dir, path) = temp_db("pull-samples");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&[variant_with_study("1", 100, 1, &[1])]).unwrap();

    // File 1 stores sample 11 under 0/1 and sample 12 under 1/1.
    let summary = database.update(&Predicate::True, &[], &[
        Mutation::PullSamples(1, vec![11]),
    ]).unwrap();
    assert_eq!(summary, UpdateSummary { matched: 1, modified: 1 }, "Wrong update summary");

    let found = database.find(&Predicate::True, &[], &FindOptions::default()).unwrap();
    let file = &found[0].studies[0].files[0];
    assert!(!file.genotypes.contains_key("0/1"), "The emptied group should be dropped");
    assert_eq!(file.genotypes.get("1/1"), Some(&vec![12]), "The other group should remain");
}

//-----------------------------------------------------------------------------

#[test]
fn delete_to_trash_and_clean() {
    let (_dir, path) = temp_db("trash");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    assert_eq!(database.trash_newest().unwrap(), None, "No trash before deletions");

    let on_chr1 = Predicate::eq(schema::CHROMOSOME, "1");
    let moved = database.delete_to_trash(&on_chr1).unwrap();
    assert_eq!(moved, 2, "Wrong number of moved variants");
    assert_eq!(database.variant_count().unwrap(), 2, "The variants should be gone");

    let entries = database.trash_entries().unwrap();
    assert_eq!(entries.len(), 2, "Wrong number of trash entries");
    let newest = database.trash_newest().unwrap();
    assert!(newest.is_some(), "The trash should have a newest timestamp");

    let removed = database.trash_delete_up_to(newest.unwrap()).unwrap();
    assert_eq!(removed, 2, "Wrong number of cleaned entries");
    assert!(database.trash_entries().unwrap().is_empty(), "The trash should be empty");

    database.drop_trash().unwrap();
    assert_eq!(database.trash_newest().unwrap(), None, "No trash after dropping the table");
}

#[test]
fn empty_variants_can_be_purged() {
    let (_dir, path) = temp_db("purge");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    database.update(&Predicate::True, &[], &[
        Mutation::PullStudy(1),
        Mutation::PullStudy(2),
    ]).unwrap();

    let empty = Predicate::ArrayEmpty { path: String::from(schema::STUDIES) };
    let moved = database.delete_to_trash(&empty).unwrap();
    assert_eq!(moved, 4, "Every emptied variant should be purged");
    assert_eq!(database.variant_count().unwrap(), 0, "The database should be empty");
}

//-----------------------------------------------------------------------------

#[test]
fn staging_table() {
    let (_dir, path) = temp_db("stage");
    let mut database = VariantBase::create(&path).unwrap();

    let mut document = Document::new();
    document.set("alt", "T");
    let key_a = VariantKey::build("1", 100, "A", "T", None);
    let key_b = VariantKey::build("1", 200, "C", "G", None);
    let rows = vec![
        (key_a.clone(), 1, 1, document.clone()),
        (key_a, 1, 2, document.clone()),
        (key_b, 1, 1, document),
    ];
    assert_eq!(database.stage_insert(&rows).unwrap(), 3, "Wrong number of staged rows");
    assert_eq!(database.stage_count().unwrap(), 3, "Wrong stage count");

    assert_eq!(database.stage_remove_file(1, 1).unwrap(), 2, "Wrong number of removed rows");
    assert_eq!(database.stage_count().unwrap(), 1, "Wrong stage count after file removal");

    assert_eq!(database.stage_remove_study(1).unwrap(), 1, "Wrong number of removed rows");
    assert_eq!(database.stage_count().unwrap(), 0, "The stage should be empty");
}

//-----------------------------------------------------------------------------

#[test]
fn cmp_predicates_against_stored_documents() {
    let (_dir, path) = temp_db("cmp");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&test_variants()).unwrap();

    let late = Predicate::cmp(schema::START, CmpOp::Gte, 200_i64);
    assert_eq!(database.count(&late, &[]).unwrap(), 2, "Wrong count for start >= 200");

    let genotype = Predicate::elem_match(schema::STUDIES, Predicate::and(vec![
        Predicate::eq(schema::STUDY_ID, 1_i64),
        Predicate::eq("files.gt.0/1", 21_i64),
    ]));
    assert_eq!(database.count(&genotype, &[]).unwrap(), 2,
        "Wrong count for the genotype condition");
}
