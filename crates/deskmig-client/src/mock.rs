//! In-memory helpdesk for tests.
//!
//! `MockHelpdesk` implements [`Transport`] over a small model of the remote
//! API: cursor-paginated lists, creates that assign ids from a counter, and
//! deletes that answer `404` for absent objects. It rejects creates the way
//! the real service does when a user/organization key or a checkbox tag is
//! already used, and forms whose layout references unknown ticket fields.
//! Scripted responses and timeouts can be queued ahead of the model, and
//! every request is journaled.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use deskmig_proto::{EntityKind, FieldCategory};

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::TransportError;
use crate::request::{ApiRequest, ApiResponse, Method};
use crate::transport::Transport;

struct Rejection {
    method: Method,
    kind: EntityKind,
    matcher: String,
    status: u16,
    body: String,
    remaining: usize,
}

struct MockState {
    next_id: u64,
    page_size: usize,
    objects: BTreeMap<EntityKind, Vec<Value>>,
    scripted: VecDeque<Result<ApiResponse, TransportError>>,
    rejections: Vec<Rejection>,
    journal: Vec<ApiRequest>,
}

/// In-memory stand-in for a helpdesk instance.
pub struct MockHelpdesk {
    state: Mutex<MockState>,
}

impl MockHelpdesk {
    /// Create an empty instance. Ids start at 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 1,
                page_size: DEFAULT_PAGE_SIZE,
                objects: BTreeMap::new(),
                scripted: VecDeque::new(),
                rejections: Vec::new(),
                journal: Vec::new(),
            }),
        }
    }

    /// Set the next id the instance assigns.
    pub fn with_next_id(self, next_id: u64) -> Self {
        self.state.lock().next_id = next_id;
        self
    }

    /// Cap the page size, regardless of what the client asks for.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().page_size = page_size.max(1);
        self
    }

    /// Store an object directly, assigning an id unless it carries one.
    pub fn seed(&self, kind: EntityKind, mut object: Value) -> u64 {
        let mut state = self.state.lock();
        let id = match object.get("id").and_then(Value::as_u64) {
            Some(id) => {
                state.next_id = state.next_id.max(id + 1);
                id
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                id
            }
        };
        if let Some(fields) = object.as_object_mut() {
            fields.insert("id".into(), json!(id));
        }
        state.objects.entry(kind).or_default().push(object);
        id
    }

    /// Queue a response returned for the next request, ahead of the model.
    pub fn push_response(&self, response: ApiResponse) {
        self.state.lock().scripted.push_back(Ok(response));
    }

    /// Queue a timeout for the next request.
    pub fn push_timeout(&self) {
        self.state.lock().scripted.push_back(Err(TransportError::Timeout));
    }

    /// Reject the next `times` creates of `kind` whose title (or form name)
    /// equals `title`.
    pub fn reject_create(&self, kind: EntityKind, title: &str, status: u16, body: &str, times: usize) {
        self.state.lock().rejections.push(Rejection {
            method: Method::Post,
            kind,
            matcher: title.to_string(),
            status,
            body: body.to_string(),
            remaining: times,
        });
    }

    /// Reject every delete of `kind` / `id`.
    pub fn reject_delete(&self, kind: EntityKind, id: u64, status: u16) {
        self.state.lock().rejections.push(Rejection {
            method: Method::Delete,
            kind,
            matcher: id.to_string(),
            status,
            body: String::new(),
            remaining: usize::MAX,
        });
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().journal.clone()
    }

    /// Number of requests received with the given method.
    pub fn request_count(&self, method: Method) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// Stored objects of one kind, in creation order.
    pub fn objects(&self, kind: EntityKind) -> Vec<Value> {
        self.state
            .lock()
            .objects
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// One stored object.
    pub fn object(&self, kind: EntityKind, id: u64) -> Option<Value> {
        self.objects(kind)
            .into_iter()
            .find(|o| o.get("id").and_then(Value::as_u64) == Some(id))
    }

    /// Whether an object exists.
    pub fn contains(&self, kind: EntityKind, id: u64) -> bool {
        self.object(kind, id).is_some()
    }
}

impl Default for MockHelpdesk {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockHelpdesk {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut state = self.state.lock();
        state.journal.push(request.clone());
        if let Some(scripted) = state.scripted.pop_front() {
            return scripted;
        }
        Ok(state.handle(request))
    }
}

fn not_found() -> ApiResponse {
    ApiResponse::new(404, r#"{"error":"RecordNotFound","description":"Not found"}"#)
}

fn invalid(attribute: &str, description: &str) -> ApiResponse {
    let body = json!({
        "error": "RecordInvalid",
        "description": "Record validation errors",
        "details": { attribute: [{ "description": description }] }
    });
    ApiResponse::new(422, body.to_string())
}

/// Split `ticket_fields.json` / `ticket_fields/12.json` into endpoint and id.
fn parse_path(path: &str) -> Option<(EntityKind, Option<u64>)> {
    let path = path.trim_start_matches('/').strip_suffix(".json")?;
    let (endpoint, id) = match path.split_once('/') {
        Some((endpoint, id)) => (endpoint, Some(id.parse().ok()?)),
        None => (path, None),
    };
    Some((EntityKind::from_endpoint(endpoint)?, id))
}

impl MockState {
    fn handle(&mut self, request: &ApiRequest) -> ApiResponse {
        let Some((kind, id)) = parse_path(&request.path) else {
            return not_found();
        };

        match (request.method, id) {
            (Method::Get, None) => self.list(kind, request),
            (Method::Post, None) => self.create(kind, request.body.as_ref()),
            (Method::Delete, Some(id)) => self.delete(kind, id),
            _ => not_found(),
        }
    }

    fn list(&self, kind: EntityKind, request: &ApiRequest) -> ApiResponse {
        let objects = self.objects.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
        let requested = request
            .query_param("page[size]")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(self.page_size);
        let size = requested.clamp(1, self.page_size);
        let start = request
            .query_param("page[after]")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0)
            .min(objects.len());
        let end = (start + size).min(objects.len());
        let has_more = end < objects.len();
        let after_cursor = has_more.then(|| end.to_string());

        let body = json!({
            kind.endpoint(): &objects[start..end],
            "meta": {
                "has_more": has_more,
                "after_cursor": after_cursor,
            }
        });
        ApiResponse::new(200, body.to_string())
    }

    fn create(&mut self, kind: EntityKind, body: Option<&Value>) -> ApiResponse {
        let Some(Value::Object(fields)) = body.and_then(|b| b.get(kind.wrapper())).cloned() else {
            return ApiResponse::new(400, r#"{"error":"InvalidEndpoint"}"#);
        };

        let title = match kind {
            EntityKind::TicketForm => fields.get("name"),
            EntityKind::Field(_) => fields.get("title"),
        }
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
        if let Some(response) = self.rejection(Method::Post, kind, &title) {
            return response;
        }
        if let Some(response) = self.validate(kind, &fields) {
            return response;
        }

        let mut object: Map<String, Value> = fields;
        let id = self.next_id;
        self.next_id += 1;
        object.insert("id".into(), json!(id));
        let object = Value::Object(object);
        self.objects.entry(kind).or_default().push(object.clone());

        ApiResponse::new(201, json!({ kind.wrapper(): object }).to_string())
    }

    fn validate(&self, kind: EntityKind, fields: &Map<String, Value>) -> Option<ApiResponse> {
        let existing = self.objects.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
        let taken = |attribute: &str| {
            let value = fields.get(attribute).and_then(Value::as_str)?;
            existing
                .iter()
                .any(|o| o.get(attribute).and_then(Value::as_str) == Some(value))
                .then(|| value.to_string())
        };

        match kind {
            EntityKind::Field(FieldCategory::User | FieldCategory::Organization) => taken("key")
                .map(|key| invalid("key", &format!("Key: {} has already been taken", key))),
            EntityKind::Field(FieldCategory::Ticket) => taken("tag")
                .map(|tag| invalid("tag", &format!("Tag: {} is already used", tag))),
            EntityKind::TicketForm => {
                let known = self
                    .objects
                    .get(&EntityKind::Field(FieldCategory::Ticket))
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let ids = fields.get("ticket_field_ids").and_then(Value::as_array)?;
                ids.iter()
                    .filter_map(Value::as_u64)
                    .find(|id| !known.iter().any(|o| o.get("id").and_then(Value::as_u64) == Some(*id)))
                    .map(|id| invalid("ticket_field_ids", &format!("Unknown ticket field {}", id)))
            }
        }
    }

    fn delete(&mut self, kind: EntityKind, id: u64) -> ApiResponse {
        if let Some(response) = self.rejection(Method::Delete, kind, &id.to_string()) {
            return response;
        }
        let Some(objects) = self.objects.get_mut(&kind) else {
            return not_found();
        };
        match objects
            .iter()
            .position(|o| o.get("id").and_then(Value::as_u64) == Some(id))
        {
            Some(index) => {
                objects.remove(index);
                ApiResponse::new(204, "")
            }
            None => not_found(),
        }
    }

    fn rejection(&mut self, method: Method, kind: EntityKind, matcher: &str) -> Option<ApiResponse> {
        let rule = self.rejections.iter_mut().find(|r| {
            r.method == method && r.kind == kind && r.matcher == matcher && r.remaining > 0
        })?;
        rule.remaining -= 1;
        Some(ApiResponse::new(rule.status, rule.body.clone()))
    }
}
