//! Attachment transfer between replicated items.
//!
//! Files are staged on disk in one folder per correlated pair, named
//! `<target id>_from_<source id>`. `download` fills the folders from the
//! source; `upload` attaches every staged file the target item does not
//! already carry. Both are idempotent.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::client::{PatchOp, RelationTarget, WorkItemQuery, WorkItemService};
use crate::error::{ServiceError, SyncError};
use crate::model::{LinkKind, LinkedEntity, fields, rel};

const BATCH: usize = 200;

static ATTACHMENT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^"'<>\s]+/_apis/wit/attachments/[^"'<>\s]+"#)
        .expect("attachment url pattern is valid")
});

/// `<dir>/<target_id>_from_<source_id>`.
#[must_use]
pub fn attachment_folder(dir: &Path, target_id: u64, source_id: u64) -> PathBuf {
    dir.join(format!("{target_id}_from_{source_id}"))
}

/// Inverse of [`attachment_folder`] on the folder name: `(target_id, source_id)`.
#[must_use]
pub fn parse_attachment_folder(name: &str) -> Option<(u64, u64)> {
    let (target, source) = name.split_once("_from_")?;
    Some((target.parse().ok()?, source.parse().ok()?))
}

/// Drop characters that are not allowed in file names on common platforms.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// The file name an attachment url stands for: its `fileName` query
/// parameter, else the last path segment.
#[must_use]
pub fn file_name_from_url(url: &str) -> Option<String> {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let from_query = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("fileName="))
        .filter(|raw| !raw.is_empty());
    let raw = match from_query {
        Some(raw) => raw,
        None => path.trim_end_matches('/').rsplit('/').next()?,
    };
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |cow| cow.into_owned());
    let name = sanitize_file_name(&decoded);
    (!name.is_empty()).then_some(name)
}

/// Attachment url to file name, from attachment relations and from
/// attachment urls embedded in string fields (inline images).
#[must_use]
pub fn collect_attachment_refs(item: &LinkedEntity) -> BTreeMap<String, String> {
    let mut refs = BTreeMap::new();

    for relation in &item.relations {
        if relation.kind() != LinkKind::Attachment || relation.url.is_empty() {
            continue;
        }
        let name = relation
            .attribute_name()
            .map(sanitize_file_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("attachment_{}", item.entity.id));
        refs.insert(relation.url.clone(), name);
    }

    for value in item.entity.fields.values() {
        let Some(text) = value.as_str() else {
            continue;
        };
        for found in ATTACHMENT_URL.find_iter(text) {
            let url = found.as_str().replace("&amp;", "&");
            if refs.contains_key(&url) {
                continue;
            }
            if let Some(name) = file_name_from_url(&url) {
                refs.insert(url, name);
            }
        }
    }
    refs
}

/// Target items paired with the source id in their correlation field.
///
/// Target ids are read in pages of `page_size` by id cursor, so no single
/// query hits the service's result limit. `max` bounds the number of target
/// items examined, in id order.
///
/// # Errors
///
/// Propagates query and batch-get failures.
pub fn correlated_pairs(
    target: &dyn WorkItemService,
    correlation_field: &str,
    max: Option<usize>,
    page_size: usize,
) -> Result<Vec<(u64, u64)>, ServiceError> {
    let page_size = page_size.max(1);
    let mut pairs = Vec::new();
    let mut examined = 0_usize;
    let mut after_id = 0_u64;

    loop {
        let limit = max.map_or(page_size, |max| page_size.min(max.saturating_sub(examined)));
        if limit == 0 {
            break;
        }
        let ids = target.query(&WorkItemQuery::All { after_id }, Some(limit))?;
        let Some(&last) = ids.last() else {
            break;
        };
        examined += ids.len();

        for chunk in ids.chunks(BATCH) {
            for item in target.batch_get(chunk, &[fields::ID, correlation_field])? {
                if let Some(source_id) = item.id_field(correlation_field) {
                    pairs.push((item.id, source_id));
                }
            }
        }
        debug!(after_id, fetched = ids.len(), "scanned target page");

        if ids.len() < limit {
            break;
        }
        after_id = last;
    }

    debug!(examined, correlated = pairs.len(), "collected correlated pairs");
    Ok(pairs)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub items: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub missing_sources: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub items: usize,
    pub uploaded: usize,
    pub already_attached: usize,
    pub missing_targets: usize,
    pub mismatched: usize,
}

/// Download the attachments of every correlated source item into `dir`.
///
/// Files already on disk are not fetched again. Target items are scanned
/// `page_size` ids at a time.
///
/// # Errors
///
/// Fails on the first remote or filesystem error.
pub fn download_attachments(
    source: &dyn WorkItemService,
    target: &dyn WorkItemService,
    dir: &Path,
    correlation_field: &str,
    max: Option<usize>,
    page_size: usize,
) -> Result<DownloadReport, SyncError> {
    fs::create_dir_all(dir).map_err(|err| SyncError::io(dir, err))?;
    let mut report = DownloadReport::default();

    for (target_id, source_id) in correlated_pairs(target, correlation_field, max, page_size)? {
        let item = match source.get_with_relations(source_id) {
            Ok(item) => item,
            Err(ServiceError::NotFound(_)) => {
                warn!(target_id, source_id, "source item not found");
                report.missing_sources += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let refs = collect_attachment_refs(&item);
        if refs.is_empty() {
            continue;
        }
        report.items += 1;

        let folder = attachment_folder(dir, target_id, source_id);
        fs::create_dir_all(&folder).map_err(|err| SyncError::io(&folder, err))?;
        for (url, name) in refs {
            let dest = folder.join(&name);
            if dest.exists() {
                report.already_present += 1;
                continue;
            }
            let bytes = source.download(&url)?;
            fs::write(&dest, &bytes).map_err(|err| SyncError::io(&dest, err))?;
            debug!(source_id, file = %dest.display(), bytes = bytes.len(), "downloaded");
            report.downloaded += 1;
        }
    }

    info!(downloaded = report.downloaded, dir = %dir.display(), "attachment download finished");
    Ok(report)
}

fn staged_files(folder: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder).map_err(|err| SyncError::io(folder, err))? {
        let path = entry.map_err(|err| SyncError::io(folder, err))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Attach every staged file under `dir` to its target item.
///
/// Files whose name the target item already carries as an attachment are
/// skipped. Folders whose source id disagrees with the target's correlation
/// value are skipped with a warning.
///
/// # Errors
///
/// Fails when `dir` cannot be read or on the first remote error.
pub fn upload_attachments(
    target: &dyn WorkItemService,
    dir: &Path,
    correlation_field: &str,
    max: Option<usize>,
) -> Result<UploadReport, SyncError> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| SyncError::io(dir, err))? {
        let entry = entry.map_err(|err| SyncError::io(dir, err))?;
        let name = entry.file_name();
        if let Some(pair) = name.to_str().and_then(parse_attachment_folder) {
            if entry.path().is_dir() {
                folders.push((pair, entry.path()));
            }
        }
    }
    folders.sort();
    if let Some(max) = max {
        folders.truncate(max);
    }

    let mut report = UploadReport::default();
    for ((target_id, source_id), folder) in folders {
        let item = match target.get_with_relations(target_id) {
            Ok(item) => item,
            Err(ServiceError::NotFound(_)) => {
                warn!(target_id, "target item not found");
                report.missing_targets += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if item.entity.id_field(correlation_field) != Some(source_id) {
            warn!(target_id, source_id, "folder does not match the target's correlation id");
            report.mismatched += 1;
            continue;
        }
        report.items += 1;

        let mut attached: BTreeSet<String> = item
            .relations
            .iter()
            .filter(|relation| relation.kind() == LinkKind::Attachment)
            .filter_map(|relation| relation.attribute_name().map(ToString::to_string))
            .collect();

        for path in staged_files(&folder)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(ToString::to_string)
            else {
                continue;
            };
            if attached.contains(&name) {
                report.already_attached += 1;
                continue;
            }
            let bytes = fs::read(&path).map_err(|err| SyncError::io(&path, err))?;
            let url = target.upload_attachment(&name, &bytes)?;

            let mut attributes = Map::new();
            attributes.insert(
                "comment".to_string(),
                Value::from(format!("Migrated attachment from source #{source_id}")),
            );
            target.patch(
                target_id,
                &[PatchOp::AddRelation {
                    rel: rel::ATTACHED_FILE.to_string(),
                    target: RelationTarget::Url(url),
                    attributes,
                }],
            )?;
            debug!(target_id, file = %name, "attached");
            attached.insert(name);
            report.uploaded += 1;
        }
    }

    info!(uploaded = report.uploaded, dir = %dir.display(), "attachment upload finished");
    Ok(report)
}
