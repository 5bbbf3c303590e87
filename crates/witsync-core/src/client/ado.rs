//! Blocking Azure DevOps REST client.
//!
//! Authentication is HTTP Basic with an empty user name and the personal
//! access token as password. There are no retries. The only timeout is the
//! one the caller configures on construction.

use std::cell::Cell;
use std::io::Read as _;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};

use super::{CommentEntry, PatchOp, RelationTarget, Revision, WorkItemQuery, WorkItemService, wiql};
use crate::config::Connection;
use crate::error::ServiceError;
use crate::model::{LinkedEntity, WorkEntity, rel};

pub const API_VERSION: &str = "7.0";
pub const COMMENTS_API_VERSION: &str = "7.0-preview.3";

/// Upper bound on ids per batch-get request.
pub const BATCH_GET_LIMIT: usize = 200;

const REVISIONS_PAGE: usize = 200;
const MAX_ERROR_BODY: usize = 512;
const USER_AGENT: &str = concat!("witsync/", env!("CARGO_PKG_VERSION"));

enum Body<'a> {
    Empty,
    Json(&'a Value),
    JsonPatch(&'a Value),
    Bytes(&'a [u8]),
}

#[derive(Debug, Deserialize)]
struct WiqlResponse {
    #[serde(default, rename = "workItems")]
    work_items: Vec<WiqlRef>,
}

#[derive(Debug, Deserialize)]
struct WiqlRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    comments: Vec<RawComment>,
    #[serde(default, rename = "continuationToken")]
    continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "createdDate")]
    created_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct AttachmentRef {
    url: String,
}

pub struct AdoClient {
    agent: ureq::Agent,
    org_url: String,
    project: String,
    authorization: String,
    requests: Cell<usize>,
}

impl std::fmt::Debug for AdoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdoClient")
            .field("org_url", &self.org_url)
            .field("project", &self.project)
            .field("requests", &self.requests.get())
            .finish_non_exhaustive()
    }
}

impl AdoClient {
    #[must_use]
    pub fn new(connection: &Connection, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let token = STANDARD.encode(format!(":{}", connection.pat));

        Self {
            agent: builder.build(),
            org_url: connection.org_url.trim_end_matches('/').to_string(),
            project: connection.project.clone(),
            authorization: format!("Basic {token}"),
            requests: Cell::new(0),
        }
    }

    /// Number of HTTP requests issued so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn org_api(&self, path: &str) -> String {
        format!("{}/_apis/{path}", self.org_url)
    }

    fn project_api(&self, path: &str) -> String {
        format!(
            "{}/{}/_apis/{path}",
            self.org_url,
            urlencoding::encode(&self.project)
        )
    }

    fn work_item_url(&self, id: u64) -> String {
        self.project_api(&format!("wit/workItems/{id}"))
    }

    fn send(
        &self,
        method: &'static str,
        url: &str,
        body: Body<'_>,
    ) -> Result<ureq::Response, ServiceError> {
        self.requests.set(self.requests.get() + 1);
        trace!(method, url, "ado request");

        let request = self
            .agent
            .request(method, url)
            .set("Authorization", &self.authorization)
            .set("Accept", "application/json");

        let result = match body {
            Body::Empty => request.call(),
            Body::Json(value) => request.send_json(value),
            Body::JsonPatch(value) => request
                .set("Content-Type", "application/json-patch+json")
                .send_string(&value.to_string()),
            Body::Bytes(bytes) => request
                .set("Content-Type", "application/octet-stream")
                .send_bytes(bytes),
        };

        result.map_err(|err| match err {
            ureq::Error::Status(status, response) => {
                let mut body = response.into_string().unwrap_or_default();
                if body.len() > MAX_ERROR_BODY {
                    let mut cut = MAX_ERROR_BODY;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                ServiceError::Status {
                    method,
                    url: url.to_string(),
                    status,
                    body,
                }
            }
            ureq::Error::Transport(transport) => ServiceError::Transport {
                url: url.to_string(),
                message: transport.to_string(),
            },
        })
    }

    fn json<T: DeserializeOwned>(
        &self,
        method: &'static str,
        url: &str,
        body: Body<'_>,
    ) -> Result<T, ServiceError> {
        self.send(method, url, body)?
            .into_json::<T>()
            .map_err(|err| ServiceError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            })
    }

    fn patch_document(&self, ops: &[PatchOp]) -> Value {
        Value::Array(
            ops.iter()
                .map(|op| match op {
                    PatchOp::AddField { name, value } => json!({
                        "op": "add",
                        "path": format!("/fields/{name}"),
                        "value": value,
                    }),
                    PatchOp::AddRelation {
                        rel,
                        target,
                        attributes,
                    } => {
                        let url = match target {
                            RelationTarget::WorkItem(id) => self.work_item_url(*id),
                            RelationTarget::Url(url) => url.clone(),
                        };
                        let mut value = json!({ "rel": rel, "url": url });
                        if !attributes.is_empty() {
                            value["attributes"] = Value::Object(attributes.clone());
                        }
                        json!({ "op": "add", "path": "/relations/-", "value": value })
                    }
                })
                .collect(),
        )
    }

    fn comments_page(
        &self,
        base: &str,
        token: Option<&str>,
    ) -> Result<CommentPage, ServiceError> {
        let url = match token {
            Some(token) => format!("{base}&continuationToken={}", urlencoding::encode(token)),
            None => base.to_string(),
        };
        self.json("GET", &url, Body::Empty)
    }

    fn comments_from(&self, base: &str) -> Result<Vec<CommentEntry>, ServiceError> {
        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.comments_page(base, token.as_deref())?;
            entries.extend(page.comments.into_iter().map(|comment| CommentEntry {
                text: comment.text.unwrap_or_default(),
                created: comment.created_date,
            }));
            match page.continuation_token.filter(|token| !token.is_empty()) {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        entries.sort_by_key(|entry| entry.created);
        Ok(entries)
    }
}

impl WorkItemService for AdoClient {
    fn project(&self) -> &str {
        &self.project
    }

    fn query(&self, query: &WorkItemQuery, top: Option<usize>) -> Result<Vec<u64>, ServiceError> {
        let text = wiql::render(query, &self.project);
        debug!(wiql = %text, ?top, "running query");

        let mut url = self.project_api(&format!("wit/wiql?api-version={API_VERSION}"));
        if let Some(top) = top {
            url.push_str(&format!("&$top={top}"));
        }
        let body = json!({ "query": text });
        let response: WiqlResponse = self.json("POST", &url, Body::Json(&body))?;
        Ok(response.work_items.into_iter().map(|item| item.id).collect())
    }

    fn batch_get(&self, ids: &[u64], fields: &[&str]) -> Result<Vec<WorkEntity>, ServiceError> {
        let url = self.org_api(&format!("wit/workitemsbatch?api-version={API_VERSION}"));
        let mut entities = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_GET_LIMIT) {
            let body = json!({ "ids": chunk, "fields": fields, "errorPolicy": "omit" });
            let page: ValueList<Option<WorkEntity>> = self.json("POST", &url, Body::Json(&body))?;
            entities.extend(page.value.into_iter().flatten());
        }
        Ok(entities)
    }

    fn get_with_relations(&self, id: u64) -> Result<LinkedEntity, ServiceError> {
        let url = self.project_api(&format!(
            "wit/workitems/{id}?$expand=relations&api-version={API_VERSION}"
        ));
        self.json("GET", &url, Body::Empty).map_err(|err| match err {
            ServiceError::Status { status: 404, .. } => ServiceError::NotFound(id),
            other => other,
        })
    }

    fn create(
        &self,
        type_name: &str,
        ops: &[PatchOp],
        parent: Option<u64>,
    ) -> Result<u64, ServiceError> {
        let url = self.project_api(&format!(
            "wit/workitems/${}?api-version={API_VERSION}",
            urlencoding::encode(type_name)
        ));
        let mut all = ops.to_vec();
        if let Some(parent) = parent {
            all.push(PatchOp::relation(
                rel::HIERARCHY_REVERSE,
                RelationTarget::WorkItem(parent),
            ));
        }
        let document = self.patch_document(&all);
        let created: Created = self.json("PATCH", &url, Body::JsonPatch(&document))?;
        Ok(created.id)
    }

    fn patch(&self, id: u64, ops: &[PatchOp]) -> Result<(), ServiceError> {
        let url = self.project_api(&format!("wit/workitems/{id}?api-version={API_VERSION}"));
        let document = self.patch_document(ops);
        self.send("PATCH", &url, Body::JsonPatch(&document))?;
        Ok(())
    }

    fn comments(&self, id: u64) -> Result<Vec<CommentEntry>, ServiceError> {
        let candidates = [
            self.org_api(&format!(
                "wit/workItems/{id}/comments?api-version={COMMENTS_API_VERSION}"
            )),
            self.project_api(&format!(
                "wit/workItems/{id}/comments?api-version={COMMENTS_API_VERSION}"
            )),
        ];

        let mut last_error = ServiceError::Unsupported(format!("comments for #{id}"));
        for base in &candidates {
            match self.comments_from(base) {
                Ok(entries) => return Ok(entries),
                Err(err) => {
                    debug!(url = %base, error = %err, "comments endpoint unavailable");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    fn revisions(&self, id: u64) -> Result<Vec<Revision>, ServiceError> {
        let mut revisions = Vec::new();
        loop {
            let url = self.project_api(&format!(
                "wit/workItems/{id}/revisions?$top={REVISIONS_PAGE}&$skip={}&api-version={API_VERSION}",
                revisions.len()
            ));
            let page: ValueList<Revision> = self.json("GET", &url, Body::Empty)?;
            let fetched = page.value.len();
            revisions.extend(page.value);
            if fetched < REVISIONS_PAGE {
                break;
            }
        }
        revisions.sort_by_key(|revision| revision.rev);
        Ok(revisions)
    }

    fn field_exists(&self, name: &str) -> bool {
        let url = self.org_api(&format!(
            "wit/fields/{}?api-version={API_VERSION}",
            urlencoding::encode(name)
        ));
        self.send("GET", &url, Body::Empty).is_ok()
    }

    fn type_exists(&self, type_name: &str) -> bool {
        let url = self.project_api(&format!(
            "wit/workitemtypes/{}?api-version={API_VERSION}",
            urlencoding::encode(type_name)
        ));
        self.send("GET", &url, Body::Empty).is_ok()
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self.send("GET", url, Body::Empty)?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| ServiceError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Ok(bytes)
    }

    fn upload_attachment(&self, file_name: &str, bytes: &[u8]) -> Result<String, ServiceError> {
        let url = self.project_api(&format!(
            "wit/attachments?fileName={}&api-version={API_VERSION}",
            urlencoding::encode(file_name)
        ));
        let attachment: AttachmentRef = self.json("POST", &url, Body::Bytes(bytes))?;
        if attachment.url.is_empty() {
            return Err(ServiceError::Decode {
                url,
                message: "no attachment url returned".to_string(),
            });
        }
        Ok(attachment.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AdoClient {
        AdoClient::new(
            &Connection {
                org_url: "https://dev.azure.com/contoso/".to_string(),
                project: "Target Project".to_string(),
                pat: "secret".to_string(),
            },
            None,
        )
    }

    #[test]
    fn urls_encode_the_project_and_trim_the_org() {
        let client = client();
        assert_eq!(
            client.work_item_url(7),
            "https://dev.azure.com/contoso/Target%20Project/_apis/wit/workItems/7"
        );
        assert_eq!(
            client.org_api("wit/fields/x"),
            "https://dev.azure.com/contoso/_apis/wit/fields/x"
        );
    }

    #[test]
    fn authorization_is_basic_with_empty_user() {
        let client = client();
        assert_eq!(client.authorization, format!("Basic {}", STANDARD.encode(":secret")));
    }

    #[test]
    fn debug_output_hides_credentials() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("Basic"));
        assert!(rendered.contains("Target Project"));
    }

    #[test]
    fn patch_document_renders_fields_and_relations() {
        let client = client();
        let mut attributes = serde_json::Map::new();
        attributes.insert("comment".to_string(), json!("migrated"));
        let document = client.patch_document(&[
            PatchOp::field("System.Title", "Hello"),
            PatchOp::relation(rel::RELATED, RelationTarget::WorkItem(12)),
            PatchOp::AddRelation {
                rel: rel::ATTACHED_FILE.to_string(),
                target: RelationTarget::Url("https://files/1".to_string()),
                attributes,
            },
        ]);

        assert_eq!(
            document[0],
            json!({ "op": "add", "path": "/fields/System.Title", "value": "Hello" })
        );
        assert_eq!(document[1]["path"], "/relations/-");
        assert_eq!(
            document[1]["value"]["url"],
            "https://dev.azure.com/contoso/Target%20Project/_apis/wit/workItems/12"
        );
        assert!(document[1]["value"].get("attributes").is_none());
        assert_eq!(document[2]["value"]["attributes"]["comment"], "migrated");
    }
}
