//! Attachment download and upload through staged folders.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;
use witsync_core::attachments::{
    attachment_folder, correlated_pairs, download_attachments, upload_attachments,
};
use witsync_core::client::memory::InMemoryService;
use witsync_core::model::{LinkKind, Relation, WorkEntity, fields};

const CORR: &str = fields::REFLECTED_WORK_ITEM_ID;
const PAGE: usize = 200;
const FILE_URL: &str = "https://dev.azure.com/org/SrcProj/_apis/wit/attachments/aaa-111";
const INLINE_URL: &str =
    "https://dev.azure.com/org/SrcProj/_apis/wit/attachments/bbb-222?fileName=diagram.png";

fn source() -> InMemoryService {
    let source = InMemoryService::new("SrcProj");
    source.insert(WorkEntity::new(100).with_field(
        fields::DESCRIPTION,
        format!(r#"<p>See <img src="{INLINE_URL}"></p>"#),
    ));
    let mut relation = Relation::new("AttachedFile", FILE_URL);
    relation
        .attributes
        .insert("name".to_string(), Value::from("requirements.pdf"));
    source.add_relation(100, relation);
    source.put_blob(FILE_URL, b"%PDF-1.7");
    source.put_blob(INLINE_URL, b"\x89PNG");
    source
}

fn target() -> InMemoryService {
    let target = InMemoryService::new("TgtProj");
    target.insert(WorkEntity::new(5000).with_field(CORR, "100"));
    target.insert(WorkEntity::new(5001));
    target
}

fn staged(dir: &Path, name: &str) -> Vec<u8> {
    fs::read(attachment_folder(dir, 5000, 100).join(name)).expect("staged file")
}

#[test]
fn download_stages_relation_and_inline_attachments() {
    let dir = TempDir::new().expect("temp dir");
    let (source, target) = (source(), target());

    let report =
        download_attachments(&source, &target, dir.path(), CORR, None, PAGE).expect("download");
    assert_eq!(report.items, 1);
    assert_eq!(report.downloaded, 2);
    assert_eq!(staged(dir.path(), "requirements.pdf"), b"%PDF-1.7");
    assert_eq!(staged(dir.path(), "diagram.png"), b"\x89PNG");

    let again =
        download_attachments(&source, &target, dir.path(), CORR, None, PAGE).expect("download again");
    assert_eq!(again.downloaded, 0);
    assert_eq!(again.already_present, 2);
}

#[test]
fn download_counts_missing_source_items() {
    let dir = TempDir::new().expect("temp dir");
    let source = InMemoryService::new("SrcProj");
    let target = target();

    let report =
        download_attachments(&source, &target, dir.path(), CORR, None, PAGE).expect("download");
    assert_eq!(report.missing_sources, 1);
    assert_eq!(report.downloaded, 0);
}

#[test]
fn upload_attaches_each_file_once() {
    let dir = TempDir::new().expect("temp dir");
    let (source, target) = (source(), target());
    download_attachments(&source, &target, dir.path(), CORR, None, PAGE).expect("download");

    let report = upload_attachments(&target, dir.path(), CORR, None).expect("upload");
    assert_eq!(report.items, 1);
    assert_eq!(report.uploaded, 2);

    let item = target.entity(5000).expect("target item");
    let comments: Vec<&str> = item
        .relations
        .iter()
        .filter(|relation| relation.kind() == LinkKind::Attachment)
        .filter_map(|relation| relation.attributes.get("comment").and_then(Value::as_str))
        .collect();
    assert_eq!(
        comments,
        vec![
            "Migrated attachment from source #100",
            "Migrated attachment from source #100"
        ]
    );

    let again = upload_attachments(&target, dir.path(), CORR, None).expect("upload again");
    assert_eq!(again.uploaded, 0);
    assert_eq!(again.already_attached, 2);
}

#[test]
fn upload_skips_mismatched_and_unknown_folders() {
    let dir = TempDir::new().expect("temp dir");
    let target = target();

    for folder in ["5001_from_999", "7777_from_1", "not-a-pair"] {
        let path = dir.path().join(folder);
        fs::create_dir_all(&path).expect("mkdir");
        fs::write(path.join("file.txt"), b"x").expect("write");
    }

    let report = upload_attachments(&target, dir.path(), CORR, None).expect("upload");
    assert_eq!(report.mismatched, 1);
    assert_eq!(report.missing_targets, 1);
    assert_eq!(report.uploaded, 0);
    assert_eq!(target.mutation_count(), 0);
}

fn large_target() -> InMemoryService {
    let target = InMemoryService::new("TgtProj");
    for id in 1..=7_u64 {
        let item = WorkEntity::new(id);
        target.insert(if id % 2 == 0 {
            item.with_field(CORR, (id * 10).to_string())
        } else {
            item
        });
    }
    target.cap_query_results(3);
    target
}

#[test]
fn target_scan_pages_below_the_query_limit() {
    let target = large_target();

    let pairs = correlated_pairs(&target, CORR, None, 2).expect("paged scan");
    assert_eq!(pairs, vec![(2, 20), (4, 40), (6, 60)]);
    assert_eq!(target.query_count(), 4);

    assert!(correlated_pairs(&target, CORR, None, 10).is_err());
}

#[test]
fn target_scan_stops_at_max() {
    let target = large_target();

    let pairs = correlated_pairs(&target, CORR, Some(3), 2).expect("bounded scan");
    assert_eq!(pairs, vec![(2, 20)]);
    assert_eq!(target.query_count(), 2);
}
