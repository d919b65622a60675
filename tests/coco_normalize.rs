use std::path::Path;

use labelprep::reconcile::coco::run_coco_normalize;
use labelprep::reconcile::ReconcileOptions;
use labelprep::schema::{CanonicalCategories, UnmappedPolicy};
use labelprep::PrepError;
use serde_json::Value;

mod common;

const DOOR_BUMPER_SWAP: &str = r#"{
  "info": {"description": "export"},
  "images": [{"id": 1, "file_name": "a.jpg"}],
  "annotations": [
    {"id": 1, "image_id": 1, "category_id": 0, "bbox": [1, 2, 3, 4]},
    {"id": 2, "image_id": 1, "category_id": 1, "bbox": [5, 6, 7, 8]}
  ],
  "categories": [
    {"id": 0, "name": "door"},
    {"id": 1, "name": "bumper"}
  ]
}"#;

fn setup(root: &Path) -> CanonicalCategories {
    common::write(&root.join("categories.json"), common::CANONICAL_CATEGORIES);
    CanonicalCategories::load(&root.join("categories.json")).expect("load canonical")
}

fn category_ids(doc: &Value) -> Vec<u64> {
    doc["annotations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["category_id"].as_u64().unwrap())
        .collect()
}

#[test]
fn swapped_categories_are_normalized_in_place() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let canonical = setup(temp.path());
    let data = temp.path().join("data");
    let file = data.join("set_a/annotations.json");
    common::write(&file, DOOR_BUMPER_SWAP);

    let report =
        run_coco_normalize(&data, &canonical, &ReconcileOptions::default()).expect("normalize");
    assert_eq!(report.totals.files, 1);
    assert_eq!(report.totals.categories_normalized, 2);
    assert_eq!(report.totals.annotations_updated, 2);
    assert!(report.unmapped_names.is_empty());

    let doc: Value = serde_json::from_str(&common::read(&file)).expect("parse output");
    assert_eq!(category_ids(&doc), vec![1, 0]);
    assert_eq!(doc["info"]["description"], "export");
    assert_eq!(doc["annotations"][0]["bbox"], serde_json::json!([1, 2, 3, 4]));

    let categories = doc["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 3);
    assert_eq!(categories[2]["name"], "hood");
    assert_eq!(categories[2]["supercategory"], "exterior");
}

#[test]
fn second_run_is_a_no_op() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let canonical = setup(temp.path());
    let data = temp.path().join("data");
    let file = data.join("set_a/annotations.json");
    common::write(&file, DOOR_BUMPER_SWAP);

    run_coco_normalize(&data, &canonical, &ReconcileOptions::default()).expect("first run");
    let after_first = common::read(&file);

    let second =
        run_coco_normalize(&data, &canonical, &ReconcileOptions::default()).expect("second run");
    assert_eq!(second.totals.categories_normalized, 0);
    assert_eq!(second.totals.annotations_updated, 0);
    assert_eq!(common::read(&file), after_first);
}

#[test]
fn dry_run_reports_without_writing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let canonical = setup(temp.path());
    let data = temp.path().join("data");
    common::write(&data.join("set_a/annotations.json"), DOOR_BUMPER_SWAP);
    let before = common::snapshot(&data);

    let opts = ReconcileOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = run_coco_normalize(&data, &canonical, &opts).expect("dry run");
    assert_eq!(report.totals.annotations_updated, 2);
    assert!(!report.files[0].written);
    assert_eq!(common::snapshot(&data), before);
}

#[test]
fn unmapped_categories_follow_policy() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let canonical = setup(temp.path());
    let data = temp.path().join("data");
    let file = data.join("set_b/annotations.json");
    let doc = r#"{
      "annotations": [
        {"id": 1, "category_id": 5},
        {"id": 2, "category_id": 6}
      ],
      "categories": [
        {"id": 5, "name": "hood"},
        {"id": 6, "name": "spoiler"}
      ]
    }"#;

    common::write(&file, doc);
    let kept = run_coco_normalize(&data, &canonical, &ReconcileOptions::default()).expect("keep");
    assert_eq!(kept.unmapped_names.iter().collect::<Vec<_>>(), vec!["spoiler"]);
    assert_eq!(kept.totals.dangling_references, 1);
    let out: Value = serde_json::from_str(&common::read(&file)).unwrap();
    assert_eq!(category_ids(&out), vec![2, 6]);

    common::write(&file, doc);
    let opts = ReconcileOptions {
        unmapped: UnmappedPolicy::Drop,
        ..Default::default()
    };
    let dropped = run_coco_normalize(&data, &canonical, &opts).expect("drop");
    assert_eq!(dropped.totals.annotations_dropped, 1);
    assert_eq!(dropped.totals.dangling_references, 0);
    let out: Value = serde_json::from_str(&common::read(&file)).unwrap();
    assert_eq!(category_ids(&out), vec![2]);

    common::write(&file, doc);
    let opts = ReconcileOptions {
        unmapped: UnmappedPolicy::Fail,
        ..Default::default()
    };
    let failed = run_coco_normalize(&data, &canonical, &opts).expect("run continues");
    assert_eq!(failed.totals.files, 0);
    assert_eq!(failed.failures.len(), 1);
    assert_eq!(common::read(&file), doc);
}

#[test]
fn broken_file_does_not_stop_the_run() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let canonical = setup(temp.path());
    let data = temp.path().join("data");
    common::write(&data.join("a/annotations.json"), "{ not json");
    common::write(&data.join("b/annotations.json"), DOOR_BUMPER_SWAP);

    let report =
        run_coco_normalize(&data, &canonical, &ReconcileOptions::default()).expect("normalize");
    assert_eq!(report.totals.files, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("a/annotations.json"));
}

#[test]
fn dataset_filter_selects_files() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let canonical = setup(temp.path());
    let data = temp.path().join("data");
    common::write(&data.join("keep/annotations.json"), DOOR_BUMPER_SWAP);
    common::write(&data.join("skip/annotations.json"), DOOR_BUMPER_SWAP);

    let opts = ReconcileOptions {
        dataset_filter: Some("keep".to_string()),
        ..Default::default()
    };
    let report = run_coco_normalize(&data, &canonical, &opts).expect("normalize");
    assert_eq!(report.totals.files, 1);
    assert_eq!(common::read(&data.join("skip/annotations.json")), DOOR_BUMPER_SWAP);
}

#[test]
fn missing_inputs_are_fatal() {
    let temp = tempfile::tempdir().expect("create temp dir");

    let err = CanonicalCategories::load(&temp.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, PrepError::CanonicalNotFound(_)));

    let canonical = setup(temp.path());
    let err = run_coco_normalize(
        &temp.path().join("no_such_root"),
        &canonical,
        &ReconcileOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PrepError::RootNotFound(_)));
}
