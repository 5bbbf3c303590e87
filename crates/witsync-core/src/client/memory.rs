//! In-process [`WorkItemService`].
//!
//! Behaves like one project of the real service closely enough for the
//! engine: ids are assigned sequentially and never reused, hierarchy and
//! related links are mirrored on both endpoints, history notes accumulate,
//! and every write bumps a mutation counter.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::{Map, Value};

use super::{CommentEntry, PatchOp, RelationTarget, Revision, WorkItemQuery, WorkItemService};
use crate::attachments::file_name_from_url;
use crate::error::ServiceError;
use crate::model::{LinkKind, LinkedEntity, Relation, WorkEntity, fields, rel};

#[derive(Debug, Clone, Default)]
struct StoredItem {
    fields: Map<String, Value>,
    relations: Vec<Relation>,
    history: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<u64, StoredItem>,
    comments: HashMap<u64, Vec<CommentEntry>>,
    revisions: HashMap<u64, Vec<Revision>>,
    blobs: HashMap<String, Vec<u8>>,
    next_id: u64,
    mutations: usize,
    failing: HashSet<u64>,
    queries_fail: bool,
    queries: usize,
    query_cap: Option<usize>,
    comments_supported: bool,
    known_fields: BTreeSet<String>,
    known_types: BTreeSet<String>,
}

#[derive(Debug)]
pub struct InMemoryService {
    project: String,
    base_url: String,
    state: RefCell<State>,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn type_matches(item: &StoredItem, types: &[String]) -> bool {
    let actual = item
        .fields
        .get(fields::WORK_ITEM_TYPE)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    types.iter().any(|t| t.to_lowercase() == actual)
}

fn server_error(what: &str) -> ServiceError {
    ServiceError::Status {
        method: "GET",
        url: format!("memory://{what}"),
        status: 500,
        body: "injected failure".to_string(),
    }
}

impl InMemoryService {
    #[must_use]
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            base_url: format!("memory://{project}/_apis/wit/workItems"),
            state: RefCell::new(State {
                next_id: 1,
                comments_supported: true,
                ..State::default()
            }),
        }
    }

    /// Start assigning ids for created items at `next_id`.
    #[must_use]
    pub fn with_next_id(self, next_id: u64) -> Self {
        self.state.borrow_mut().next_id = next_id;
        self
    }

    fn url_for(&self, id: u64) -> String {
        format!("{}/{id}", self.base_url)
    }

    /// Store an item as-is under its own id (source fixtures).
    pub fn insert(&self, entity: WorkEntity) {
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.max(entity.id + 1);
        let mut map = entity.fields;
        map.insert(fields::ID.to_string(), Value::from(entity.id));
        map
            .entry(fields::TEAM_PROJECT.to_string())
            .or_insert_with(|| Value::from(self.project.clone()));
        state.items.insert(
            entity.id,
            StoredItem {
                fields: map,
                ..StoredItem::default()
            },
        );
    }

    /// Add a link from `from` to `to` without mirroring it.
    pub fn link(&self, from: u64, rel_type: &str, to: u64) {
        let url = self.url_for(to);
        if let Some(item) = self.state.borrow_mut().items.get_mut(&from) {
            item.relations.push(Relation::new(rel_type, url));
        }
    }

    /// Add an arbitrary relation, such as an attachment link.
    pub fn add_relation(&self, id: u64, relation: Relation) {
        if let Some(item) = self.state.borrow_mut().items.get_mut(&id) {
            item.relations.push(relation);
        }
    }

    pub fn add_comment(&self, id: u64, text: &str) {
        self.state
            .borrow_mut()
            .comments
            .entry(id)
            .or_default()
            .push(CommentEntry {
                text: text.to_string(),
                created: None,
            });
    }

    pub fn add_revision(&self, id: u64, history: Option<&str>) {
        let mut state = self.state.borrow_mut();
        let revisions = state.revisions.entry(id).or_default();
        let mut map = Map::new();
        if let Some(history) = history {
            map.insert(fields::HISTORY.to_string(), Value::from(history));
        }
        revisions.push(Revision {
            rev: revisions.len() as u64 + 1,
            fields: map,
        });
    }

    /// Make the comments endpoint fail, forcing the revision fallback.
    pub fn set_comments_supported(&self, supported: bool) {
        self.state.borrow_mut().comments_supported = supported;
    }

    /// Make every read of `id` fail with a server error.
    pub fn fail_reads_of(&self, id: u64) {
        self.state.borrow_mut().failing.insert(id);
    }

    /// Make every query fail with a server error.
    pub fn fail_queries(&self) {
        self.state.borrow_mut().queries_fail = true;
    }

    /// Reject any query returning more than `cap` ids, like the service's
    /// WIQL result limit.
    pub fn cap_query_results(&self, cap: usize) {
        self.state.borrow_mut().query_cap = Some(cap);
    }

    /// Number of queries issued so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.state.borrow().queries
    }

    pub fn register_field(&self, name: &str) {
        self.state.borrow_mut().known_fields.insert(name.to_string());
    }

    pub fn register_type(&self, type_name: &str) {
        self.state
            .borrow_mut()
            .known_types
            .insert(type_name.to_lowercase());
    }

    pub fn put_blob(&self, url: &str, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .blobs
            .insert(url.to_string(), bytes.to_vec());
    }

    /// Number of create/patch/upload calls served.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.state.borrow().mutations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn entity(&self, id: u64) -> Option<LinkedEntity> {
        self.state.borrow().items.get(&id).map(|item| LinkedEntity {
            entity: WorkEntity {
                id,
                fields: item.fields.clone(),
            },
            relations: item.relations.clone(),
        })
    }

    /// Ids of items whose `field` renders as `value`.
    #[must_use]
    pub fn find_by_field(&self, field: &str, value: &str) -> Vec<u64> {
        self.state
            .borrow()
            .items
            .iter()
            .filter(|(_, item)| item.fields.get(field).and_then(value_text).as_deref() == Some(value))
            .map(|(id, _)| *id)
            .collect()
    }

    /// History notes appended to `id`, in write order.
    #[must_use]
    pub fn history(&self, id: u64) -> Vec<String> {
        self.state
            .borrow()
            .items
            .get(&id)
            .map(|item| item.history.clone())
            .unwrap_or_default()
    }

    /// Ids linked from `id` with a relation of the given kind.
    #[must_use]
    pub fn linked(&self, id: u64, kind: LinkKind) -> Vec<u64> {
        self.state
            .borrow()
            .items
            .get(&id)
            .map(|item| {
                item.relations
                    .iter()
                    .filter(|relation| relation.kind() == kind)
                    .filter_map(Relation::linked_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_readable(&self, id: u64) -> Result<(), ServiceError> {
        if self.state.borrow().failing.contains(&id) {
            return Err(server_error(&format!("workItems/{id}")));
        }
        Ok(())
    }

    fn apply(&self, state: &mut State, id: u64, ops: &[PatchOp]) -> Result<(), ServiceError> {
        for op in ops {
            match op {
                PatchOp::AddField { name, value } => {
                    let item = state.items.get_mut(&id).ok_or(ServiceError::NotFound(id))?;
                    if name == fields::HISTORY {
                        if let Some(text) = value_text(value) {
                            item.history.push(text);
                        }
                    }
                    item.fields.insert(name.clone(), value.clone());
                }
                PatchOp::AddRelation {
                    rel: rel_type,
                    target,
                    attributes,
                } => {
                    let url = match target {
                        RelationTarget::WorkItem(other) => self.url_for(*other),
                        RelationTarget::Url(url) => url.clone(),
                    };
                    let mut relation = Relation {
                        rel: rel_type.clone(),
                        url,
                        attributes: attributes.clone(),
                    };
                    if relation.kind() == LinkKind::Attachment && relation.attribute_name().is_none() {
                        if let Some(name) = file_name_from_url(&relation.url) {
                            relation.attributes.insert("name".to_string(), Value::from(name));
                        }
                    }
                    let mirror = match (relation.kind(), target) {
                        (LinkKind::Parent, RelationTarget::WorkItem(other)) => {
                            Some((*other, rel::HIERARCHY_FORWARD))
                        }
                        (LinkKind::Child, RelationTarget::WorkItem(other)) => {
                            Some((*other, rel::HIERARCHY_REVERSE))
                        }
                        (LinkKind::Related, RelationTarget::WorkItem(other)) => {
                            Some((*other, rel::RELATED))
                        }
                        _ => None,
                    };
                    if let Some((other, _)) = mirror {
                        if !state.items.contains_key(&other) {
                            return Err(ServiceError::NotFound(other));
                        }
                    }
                    state
                        .items
                        .get_mut(&id)
                        .ok_or(ServiceError::NotFound(id))?
                        .relations
                        .push(relation);
                    if let Some((other, mirror_rel)) = mirror {
                        let back = Relation::new(mirror_rel, self.url_for(id));
                        if let Some(item) = state.items.get_mut(&other) {
                            item.relations.push(back);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl WorkItemService for InMemoryService {
    fn project(&self) -> &str {
        &self.project
    }

    fn query(&self, query: &WorkItemQuery, top: Option<usize>) -> Result<Vec<u64>, ServiceError> {
        let mut state = self.state.borrow_mut();
        state.queries += 1;
        if state.queries_fail {
            return Err(server_error("wiql"));
        }

        let mut ids: Vec<u64> = match query {
            WorkItemQuery::Roots {
                types,
                after_id,
                exclude,
            } => state
                .items
                .range(after_id.saturating_add(1)..)
                .filter(|(_, item)| type_matches(item, types))
                .filter(|(_, item)| {
                    exclude.as_ref().is_none_or(|exclusion| {
                        item.fields.get(&exclusion.field).and_then(value_text).as_deref()
                            != Some(exclusion.value.as_str())
                    })
                })
                .map(|(id, _)| *id)
                .collect(),
            WorkItemQuery::FieldEquals { field, value } => state
                .items
                .iter()
                .filter(|(_, item)| {
                    item.fields.get(field).and_then(value_text).as_deref() == Some(value.as_str())
                })
                .map(|(id, _)| *id)
                .collect(),
            WorkItemQuery::All { after_id } => state
                .items
                .range(after_id.saturating_add(1)..)
                .map(|(id, _)| *id)
                .collect(),
            WorkItemQuery::RecentlyCreated { types } => {
                let mut matching: Vec<(Option<String>, u64)> = state
                    .items
                    .iter()
                    .filter(|(_, item)| type_matches(item, types))
                    .map(|(id, item)| {
                        let created = item.fields.get(fields::CREATED_DATE).and_then(value_text);
                        (created, *id)
                    })
                    .collect();
                matching.sort_by(|a, b| b.cmp(a));
                matching.into_iter().map(|(_, id)| id).collect()
            }
        };

        if let Some(top) = top {
            ids.truncate(top);
        }
        if state.query_cap.is_some_and(|cap| ids.len() > cap) {
            return Err(ServiceError::Status {
                method: "POST",
                url: format!("{}/wiql", self.base_url),
                status: 400,
                body: "VS402337: the number of work items returned exceeds the size limit"
                    .to_string(),
            });
        }
        Ok(ids)
    }

    fn batch_get(&self, ids: &[u64], wanted: &[&str]) -> Result<Vec<WorkEntity>, ServiceError> {
        for id in ids {
            self.check_readable(*id)?;
        }
        let state = self.state.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| {
                let item = state.items.get(id)?;
                let fields = item
                    .fields
                    .iter()
                    .filter(|(name, _)| wanted.is_empty() || wanted.contains(&name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                Some(WorkEntity { id: *id, fields })
            })
            .collect())
    }

    fn get_with_relations(&self, id: u64) -> Result<LinkedEntity, ServiceError> {
        self.check_readable(id)?;
        self.entity(id).ok_or(ServiceError::NotFound(id))
    }

    fn create(
        &self,
        type_name: &str,
        ops: &[PatchOp],
        parent: Option<u64>,
    ) -> Result<u64, ServiceError> {
        let mut state = self.state.borrow_mut();
        if let Some(parent) = parent {
            if !state.items.contains_key(&parent) {
                return Err(ServiceError::NotFound(parent));
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.mutations += 1;

        let mut map = Map::new();
        map.insert(fields::ID.to_string(), Value::from(id));
        map.insert(fields::WORK_ITEM_TYPE.to_string(), Value::from(type_name));
        map.insert(
            fields::TEAM_PROJECT.to_string(),
            Value::from(self.project.clone()),
        );
        state.items.insert(
            id,
            StoredItem {
                fields: map,
                ..StoredItem::default()
            },
        );

        let mut all = ops.to_vec();
        if let Some(parent) = parent {
            all.push(PatchOp::relation(
                rel::HIERARCHY_REVERSE,
                RelationTarget::WorkItem(parent),
            ));
        }
        if let Err(err) = self.apply(&mut state, id, &all) {
            state.items.remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    fn patch(&self, id: u64, ops: &[PatchOp]) -> Result<(), ServiceError> {
        let mut state = self.state.borrow_mut();
        if !state.items.contains_key(&id) {
            return Err(ServiceError::NotFound(id));
        }
        state.mutations += 1;
        self.apply(&mut state, id, ops)
    }

    fn comments(&self, id: u64) -> Result<Vec<CommentEntry>, ServiceError> {
        self.check_readable(id)?;
        let state = self.state.borrow();
        if !state.comments_supported {
            return Err(ServiceError::Unsupported(format!("comments for #{id}")));
        }
        Ok(state.comments.get(&id).cloned().unwrap_or_default())
    }

    fn revisions(&self, id: u64) -> Result<Vec<Revision>, ServiceError> {
        self.check_readable(id)?;
        Ok(self
            .state
            .borrow()
            .revisions
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    fn field_exists(&self, name: &str) -> bool {
        let state = self.state.borrow();
        state.known_fields.contains(name)
            || state.items.values().any(|item| item.fields.contains_key(name))
    }

    fn type_exists(&self, type_name: &str) -> bool {
        let wanted = type_name.to_lowercase();
        let state = self.state.borrow();
        state.known_types.contains(&wanted)
            || state.items.values().any(|item| {
                item.fields
                    .get(fields::WORK_ITEM_TYPE)
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.to_lowercase() == wanted)
            })
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        self.state
            .borrow()
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| ServiceError::Status {
                method: "GET",
                url: url.to_string(),
                status: 404,
                body: "no such attachment".to_string(),
            })
    }

    fn upload_attachment(&self, file_name: &str, bytes: &[u8]) -> Result<String, ServiceError> {
        let mut state = self.state.borrow_mut();
        state.mutations += 1;
        let url = format!(
            "memory://{}/_apis/wit/attachments/{}?fileName={file_name}",
            self.project,
            state.blobs.len() + 1
        );
        state.blobs.insert(url.clone(), bytes.to_vec());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Exclusion;

    fn bundle(id: u64) -> WorkEntity {
        WorkEntity::new(id).with_field(fields::WORK_ITEM_TYPE, "Work Bundle")
    }

    #[test]
    fn roots_query_is_exclusive_ascending_and_bounded() {
        let service = InMemoryService::new("P");
        for id in [5, 3, 9, 7] {
            service.insert(bundle(id));
        }
        service.insert(WorkEntity::new(6).with_field(fields::WORK_ITEM_TYPE, "Issue"));

        let query = WorkItemQuery::Roots {
            types: vec!["work bundle".to_string()],
            after_id: 3,
            exclude: None,
        };
        assert_eq!(service.query(&query, None).expect("query"), vec![5, 7, 9]);
        assert_eq!(service.query(&query, Some(2)).expect("query"), vec![5, 7]);
    }

    #[test]
    fn exclusion_keeps_items_without_the_field() {
        let service = InMemoryService::new("P");
        service.insert(bundle(1).with_field("Custom.OwnerOrg", "Contoso"));
        service.insert(bundle(2).with_field("Custom.OwnerOrg", "Fabrikam"));
        service.insert(bundle(3));

        let query = WorkItemQuery::Roots {
            types: vec!["Work Bundle".to_string()],
            after_id: 0,
            exclude: Some(Exclusion {
                field: "Custom.OwnerOrg".to_string(),
                value: "Contoso".to_string(),
            }),
        };
        assert_eq!(service.query(&query, None).expect("query"), vec![2, 3]);
    }

    #[test]
    fn create_links_parent_both_ways_and_counts_mutations() {
        let service = InMemoryService::new("T").with_next_id(500);
        let parent = service
            .create("Work Bundle", &[PatchOp::field(fields::TITLE, "P")], None)
            .expect("create parent");
        let child = service
            .create("User Story", &[PatchOp::field(fields::TITLE, "C")], Some(parent))
            .expect("create child");

        assert_eq!((parent, child), (500, 501));
        assert_eq!(service.linked(parent, LinkKind::Child), vec![child]);
        assert_eq!(service.linked(child, LinkKind::Parent), vec![parent]);
        assert_eq!(service.mutation_count(), 2);
    }

    #[test]
    fn create_with_missing_parent_leaves_no_item_behind() {
        let service = InMemoryService::new("T");
        let result = service.create("User Story", &[], Some(77));
        assert!(matches!(result, Err(ServiceError::NotFound(77))));
        assert!(service.is_empty());
    }

    #[test]
    fn history_patches_accumulate() {
        let service = InMemoryService::new("T");
        service.insert(bundle(1));
        service.patch(1, &[PatchOp::history("one")]).expect("patch");
        service.patch(1, &[PatchOp::history("two")]).expect("patch");
        assert_eq!(service.history(1), vec!["one", "two"]);
    }

    #[test]
    fn attachment_links_get_a_name_like_the_service_sets() {
        let service = InMemoryService::new("T");
        service.insert(bundle(1));
        let url = service.upload_attachment("notes.txt", b"hi").expect("upload");
        service
            .patch(1, &[PatchOp::relation(rel::ATTACHED_FILE, RelationTarget::Url(url))])
            .expect("patch");
        let item = service.entity(1).expect("stored");
        assert_eq!(item.relations[0].attribute_name(), Some("notes.txt"));
    }

    #[test]
    fn injected_failures_surface_as_status_errors() {
        let service = InMemoryService::new("S");
        service.insert(bundle(1));
        service.fail_reads_of(1);
        assert!(matches!(
            service.batch_get(&[1], &[]),
            Err(ServiceError::Status { status: 500, .. })
        ));
    }
}
