use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

mod common;

fn labelprep() -> Command {
    let mut cmd = Command::cargo_bin("labelprep").unwrap();
    cmd.env_remove("LABELPREP_ROOT")
        .env_remove("LABELPREP_CATEGORIES")
        .env_remove("LABELPREP_REFERENCE_YAML")
        .env_remove("RUST_LOG");
    cmd
}

fn coco_fixture(root: &Path) {
    common::write(&root.join("categories.json"), common::CANONICAL_CATEGORIES);
    common::write(
        &root.join("data/set_a/annotations.json"),
        r#"{"annotations": [{"id": 1, "category_id": 7}],
            "categories": [{"id": 7, "name": "door"}, {"id": 8, "name": "spoiler"}]}"#,
    );
}

fn yolo_fixture(root: &Path) {
    common::write(&root.join("reference.yaml"), common::REFERENCE_YAML);
    common::write(
        &root.join("raw/set_a/data.yaml"),
        "names: ['door', 'Mất']\n",
    );
    common::write(
        &root.join("raw/set_a/labels/train/a.txt"),
        "0 0.5 0.5 0.1 0.1\n1 0.2 0.2 0.1 0.1\n",
    );
}

#[test]
fn runs() {
    labelprep()
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch preparation"));
}

#[test]
fn outputs_tool_name() {
    labelprep()
        .arg("-V")
        .assert()
        .success()
        .stdout("labelprep 0.1.0\n");
}

#[test]
fn coco_normalize_json_report() {
    let temp = tempfile::tempdir().expect("create temp dir");
    coco_fixture(temp.path());

    let output = labelprep()
        .args(["coco-normalize", "--output", "json", "--root"])
        .arg(temp.path().join("data"))
        .arg("--categories")
        .arg(temp.path().join("categories.json"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).expect("stdout is JSON");
    assert_eq!(report["totals"]["files"], 1);
    assert_eq!(report["totals"]["annotations_updated"], 1);
    assert_eq!(report["unmapped_names"], serde_json::json!(["spoiler"]));
    assert_eq!(report["dry_run"], false);
}

#[test]
fn coco_normalize_reads_paths_from_env() {
    let temp = tempfile::tempdir().expect("create temp dir");
    coco_fixture(temp.path());

    labelprep()
        .arg("coco-normalize")
        .env("LABELPREP_ROOT", temp.path().join("data"))
        .env("LABELPREP_CATEGORIES", temp.path().join("categories.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Annotations updated:    1"))
        .stdout(predicate::str::contains("- spoiler"));
}

#[test]
fn coco_normalize_missing_canonical_fails() {
    let temp = tempfile::tempdir().expect("create temp dir");

    labelprep()
        .args(["coco-normalize", "--root"])
        .arg(temp.path())
        .arg("--categories")
        .arg(temp.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: Canonical schema file not found"));
}

#[test]
fn yolo_normalize_dry_run_writes_nothing() {
    let temp = tempfile::tempdir().expect("create temp dir");
    yolo_fixture(temp.path());
    let label = temp.path().join("raw/set_a/labels/train/a.txt");
    let before = fs::read(&label).unwrap();

    labelprep()
        .args(["yolo-normalize", "--dry-run", "--root"])
        .arg(temp.path().join("raw"))
        .arg("--reference")
        .arg(temp.path().join("reference.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Annotations remapped:         1"))
        .stdout(predicate::str::contains("Annotations removed (damage): 1"))
        .stdout(predicate::str::contains("DRY RUN"));

    assert_eq!(fs::read(&label).unwrap(), before);
}

#[test]
fn yolo_normalize_without_damage_filter_keeps_lines() {
    let temp = tempfile::tempdir().expect("create temp dir");
    yolo_fixture(temp.path());
    let label = temp.path().join("raw/set_a/labels/train/a.txt");

    labelprep()
        .args(["yolo-normalize", "--no-damage-filter", "--root"])
        .arg(temp.path().join("raw"))
        .arg("--reference")
        .arg(temp.path().join("reference.yaml"))
        .assert()
        .success();

    assert_eq!(
        common::read(&label),
        "1 0.5 0.5 0.1 0.1\n1 0.2 0.2 0.1 0.1\n"
    );
}

#[test]
fn damage_flags_conflict() {
    labelprep()
        .args([
            "yolo-normalize",
            "--root",
            ".",
            "--reference",
            "r.yaml",
            "--no-damage-filter",
            "--damage-class",
            "Mất",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn unknown_unmapped_policy_is_rejected() {
    labelprep()
        .args([
            "coco-normalize",
            "--root",
            ".",
            "--categories",
            "c.json",
            "--unmapped",
            "ignore",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'ignore'"));
}

#[test]
fn split_moves_listed_files() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let data = temp.path();
    common::write(&data.join("images/train/a.jpg"), "a");
    common::write(&data.join("labels/train/a.txt"), "0 0.5 0.5 0.1 0.1\n");
    common::write(&data.join("val.txt"), "a.jpg\n");

    labelprep()
        .args(["split", "--val-list"])
        .arg(data.join("val.txt"))
        .arg("--data-dir")
        .arg(data)
        .assert()
        .success()
        .stdout(predicate::str::contains("Images moved:      1"));

    assert!(data.join("images/val/a.jpg").is_file());
    assert!(data.join("labels/val/a.txt").is_file());
}

#[test]
fn unzip_json_report() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let zip_path = temp.path().join("c1/export.zip");
    fs::create_dir_all(zip_path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
    zip.start_file("images.json", zip::write::SimpleFileOptions::default())
        .unwrap();
    std::io::Write::write_all(&mut zip, b"[]").unwrap();
    zip.finish().unwrap();

    let output = labelprep()
        .args(["unzip", "--output", "json", "--root"])
        .arg(temp.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).expect("stdout is JSON");
    assert_eq!(report["extracted"], 1);
    assert_eq!(common::read(&temp.path().join("c1/export/images.json")), "[]");
}

#[test]
fn download_with_no_datasets_creates_output_tree() {
    let temp = tempfile::tempdir().expect("create temp dir");
    fs::create_dir_all(temp.path().join("raw")).unwrap();

    labelprep()
        .args(["download", "--raw-dir"])
        .arg(temp.path().join("raw"))
        .arg("--output-dir")
        .arg(temp.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Datasets processed: 0"));

    assert!(temp.path().join("out/images/train").is_dir());
    assert!(temp.path().join("out/labels/train").is_dir());
}

#[test]
fn download_rejects_zero_workers() {
    let temp = tempfile::tempdir().expect("create temp dir");

    labelprep()
        .args(["download", "--max-workers", "0", "--raw-dir"])
        .arg(temp.path())
        .arg("--output-dir")
        .arg(temp.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid options"));
}
