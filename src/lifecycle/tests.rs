use super::*;

use crate::document::Document;
use crate::key::VariantKey;
use crate::metadata::StudyRegistry;
use crate::store::FindOptions;
use crate::variant::{FileRecord, StudyRecord, Variant};

use tempfile::TempDir;

//-----------------------------------------------------------------------------

// Study 1 with sample 1 in file 1 and sample 2 in file 2.
fn demo_registry() -> (StudyRegistry, i32) {
    let mut registry = StudyRegistry::new();
    let study = registry.add_study("demo");
    let s1 = registry.add_sample(study, "S1");
    let s2 = registry.add_sample(study, "S2");
    let f1 = registry.add_file(study, "a.vcf", vec![s1]);
    let f2 = registry.add_file(study, "b.vcf", vec![s2]);
    registry.index_file(study, f1);
    registry.index_file(study, f2);
    (registry, study)
}

fn file_with_genotype(file_id: i32, genotype: &str, samples: Vec<i32>) -> FileRecord {
    let mut file = FileRecord::new(file_id);
    file.genotypes.insert(genotype.to_string(), samples);
    file
}

// Two variants: one only in file 1, one in both files.
fn demo_variants(study: i32) -> Vec<Variant> {
    let mut only_first = Variant::new("1", 100, "A", "T");
    let mut record = StudyRecord::new(study);
    record.files.push(file_with_genotype(1, "0/1", vec![1]));
    only_first.studies.push(record);

    let mut in_both = Variant::new("1", 200, "C", "G");
    let mut record = StudyRecord::new(study);
    record.files.push(file_with_genotype(1, "0/1", vec![1]));
    record.files.push(file_with_genotype(2, "1/1", vec![2]));
    in_both.studies.push(record);

    vec![only_first, in_both]
}

fn demo_database(study: i32) -> (TempDir, VariantBase) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lifecycle.db");
    let mut database = VariantBase::create(&path).unwrap();
    database.insert(&demo_variants(study)).unwrap();
    (dir, database)
}

//-----------------------------------------------------------------------------

#[test]
fn removing_one_file_keeps_the_other() {
    let (registry, study) = demo_registry();
    let (_dir, mut database) = demo_database(study);

    let summary = {
        let mut manager = LifecycleManager::new(&mut database, &registry);
        manager.remove_files(study, &[1]).unwrap()
    };
    assert_eq!(summary.modified, 2, "Both variants should change");
    assert_eq!(summary.purged, 1, "The variant with only file 1 should be purged");

    let remaining = database.find(&Predicate::True, &[], &FindOptions::default()).unwrap();
    assert_eq!(remaining.len(), 1, "Wrong number of remaining variants");
    let variant = &remaining[0];
    assert_eq!(variant.start, 200, "Wrong remaining variant");
    let files: Vec<i32> = variant.studies[0].files.iter().map(|f| f.absolute_id()).collect();
    assert_eq!(files, vec![2], "Only file 2 should remain");
    // Sample 1 only appeared in file 1, so it left the genotype groups.
    for file in &variant.studies[0].files {
        for members in file.genotypes.values() {
            assert!(!members.contains(&1), "Sample 1 should be gone");
        }
    }

    let tag = database.get_tag("stats_desync_1").unwrap();
    assert_eq!(tag, Some(String::from("true")), "The stats should be marked stale");
}

#[test]
fn removing_every_file_removes_the_study() {
    let (registry, study) = demo_registry();
    let (_dir, mut database) = demo_database(study);

    let summary = {
        let mut manager = LifecycleManager::new(&mut database, &registry);
        manager.remove_files(study, &[1, 2]).unwrap()
    };
    assert_eq!(summary.purged, 2, "Every variant of the study should be purged");
    assert_eq!(database.variant_count().unwrap(), 0, "The database should be empty");
}

#[test]
fn remove_study_without_purge_leaves_empty_variants() {
    let (registry, study) = demo_registry();
    let (_dir, mut database) = demo_database(study);

    let summary = {
        let mut manager = LifecycleManager::new(&mut database, &registry);
        manager.remove_study(study, false).unwrap()
    };
    assert_eq!(summary.modified, 2, "Both variants should change");
    assert_eq!(summary.purged, 0, "Nothing should be purged without the flag");
    assert_eq!(database.variant_count().unwrap(), 2, "The rows should remain");

    let remaining = database.find(&Predicate::True, &[], &FindOptions::default()).unwrap();
    assert!(remaining.iter().all(|v| v.studies.is_empty()),
        "The study entries should be gone");

    let purged = {
        let mut manager = LifecycleManager::new(&mut database, &registry);
        manager.purge_empty_variants().unwrap()
    };
    assert_eq!(purged, 2, "A later purge should collect the emptied variants");
    assert_eq!(database.variant_count().unwrap(), 0, "The database should be empty");
}

#[test]
fn removal_strips_staged_rows() {
    let (registry, study) = demo_registry();
    let (_dir, mut database) = demo_database(study);

    let mut document = Document::new();
    document.set("alt", "T");
    let key = VariantKey::build("1", 300, "G", "T", None);
    database.stage_insert(&[
        (key.clone(), study, 1, document.clone()),
        (key, study, 2, document),
    ]).unwrap();

    let summary = {
        let mut manager = LifecycleManager::new(&mut database, &registry);
        manager.remove_files(study, &[1]).unwrap()
    };
    assert_eq!(summary.staged, 1, "The staged row of file 1 should be stripped");
    assert_eq!(database.stage_count().unwrap(), 1, "The row of file 2 should remain");
}

//-----------------------------------------------------------------------------

#[test]
fn clean_trash_drops_the_table_when_everything_is_old() {
    let (registry, study) = demo_registry();
    let (_dir, mut database) = demo_database(study);

    {
        let mut manager = LifecycleManager::new(&mut database, &registry);
        manager.remove_study(study, true).unwrap();
    }
    let newest = database.trash_newest().unwrap();
    let newest = newest.unwrap();

    let removed = {
        let mut manager = LifecycleManager::new(&mut database, &registry);
        // An earlier timestamp does not touch newer entries.
        let untouched = manager.clean_trash(newest - 1).unwrap();
        assert_eq!(untouched, 0, "Newer entries should survive");
        manager.clean_trash(newest).unwrap()
    };
    assert_eq!(removed, 2, "Everything should be discarded");
    assert_eq!(database.trash_newest().unwrap(), None, "The trash table should be gone");
}

#[test]
fn clean_trash_on_an_empty_database() {
    let (registry, study) = demo_registry();
    let (_dir, mut database) = demo_database(study);

    let mut manager = LifecycleManager::new(&mut database, &registry);
    let removed = manager.clean_trash(i64::MAX).unwrap();
    assert_eq!(removed, 0, "Nothing to clean without a trash table");
}
