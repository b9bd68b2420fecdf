use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::entity::Entity;
use crate::error::{ApiError, ApiResult};
use crate::filter::{FieldFilter, ViewFilters, derive_view};
use crate::schema::{MutationOp, ResourceSchema};
use crate::token::extract_scope_id;
use crate::transport::{ApiRequest, Method};

/// Keys a list response may wrap its records under.
const LIST_KEYS: [&str; 3] = ["data", "items", "$values"];

/// Lifecycle of a list page.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle,
    Loading,
    Ready,
    Failed(ApiError),
}

/// A user's request to change one record.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent {
    pub entity_id: i64,
    pub operation: MutationOp,
    pub payload: Option<Map<String, Value>>,
}

impl MutationIntent {
    pub fn new(entity_id: i64, operation: MutationOp) -> Self {
        Self {
            entity_id,
            operation,
            payload: None,
        }
    }

    pub fn approve(entity_id: i64) -> Self {
        Self::new(entity_id, MutationOp::Approve)
    }

    pub fn reject(entity_id: i64) -> Self {
        Self::new(entity_id, MutationOp::Reject)
    }

    pub fn delete(entity_id: i64) -> Self {
        Self::new(entity_id, MutationOp::Delete)
    }

    pub fn update(entity_id: i64, payload: Map<String, Value>) -> Self {
        Self {
            entity_id,
            operation: MutationOp::Update,
            payload: Some(payload),
        }
    }
}

/// What a confirmed mutation did to the local collection.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Updated(Entity),
    Removed(i64),
}

impl MutationOutcome {
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            MutationOutcome::Updated(entity) => Some(entity),
            MutationOutcome::Removed(_) => None,
        }
    }
}

#[derive(Debug)]
struct ListState {
    status: ViewState,
    raw: Vec<Entity>,
    filters: ViewFilters,
    pending: HashSet<i64>,
}

/// One list page: a scoped fetch, a local copy of the records, the filters
/// the user has set, and the mutations the page offers.
///
/// Local state is only ever changed after the server confirms. Mutations on
/// the same record are queued behind each other; mutations on different
/// records run concurrently. Share the view behind an `Arc` to drive it
/// from several tasks.
pub struct ScopedListView {
    client: ApiClient,
    schema: ResourceSchema,
    state: Mutex<ListState>,
    entity_locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
    cancel: CancellationToken,
}

impl ScopedListView {
    pub fn new(client: ApiClient, schema: ResourceSchema) -> Self {
        let filters = ViewFilters::new().searching(schema.search_fields.iter().cloned());
        Self {
            client,
            schema,
            state: Mutex::new(ListState {
                status: ViewState::Idle,
                raw: Vec::new(),
                filters,
                pending: HashSet::new(),
            }),
            entity_locks: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn state(&self) -> ViewState {
        self.state.lock().status.clone()
    }

    /// Copy of the collection last fetched, as reconciled since.
    pub fn raw(&self) -> Vec<Entity> {
        self.state.lock().raw.clone()
    }

    pub fn filters(&self) -> ViewFilters {
        self.state.lock().filters.clone()
    }

    pub fn set_filters(&self, filters: ViewFilters) {
        self.state.lock().filters = filters;
    }

    pub fn set_search(&self, text: impl Into<String>) {
        self.state.lock().filters.search_text = text.into();
    }

    pub fn set_filter(&self, path: impl Into<String>, filter: FieldFilter) {
        self.state.lock().filters.field_filters.insert(path.into(), filter);
    }

    /// The records the user currently sees.
    pub fn view(&self) -> Vec<Entity> {
        let state = self.state.lock();
        derive_view(&state.raw, &state.filters)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Whether a mutation on `id` is in flight.
    pub fn is_pending(&self, id: i64) -> bool {
        self.state.lock().pending.contains(&id)
    }

    /// Abort in-flight requests. Nothing that completes afterwards touches
    /// the view, and later calls fail with `Cancelled`.
    pub fn teardown(&self) {
        self.cancel.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetch the page's collection and replace the local copy with it.
    ///
    /// Fails `Unauthorized` before any I/O when no credential is stored.
    /// Exactly one request is made; there is no retry.
    ///
    /// # Returns
    /// * `ApiResult<Vec<Entity>>` - The freshly fetched collection
    ///
    /// # Errors
    /// * `Unauthorized` / `MalformedToken` when the credential is absent or unusable
    /// * `Server`, `Forbidden`, `NotFound`, `Conflict` when the server refuses
    /// * `Network` when no response arrived
    /// * `Cancelled` after [`ScopedListView::teardown`]
    pub async fn load(&self) -> ApiResult<Vec<Entity>> {
        if self.is_torn_down() {
            return Err(ApiError::Cancelled);
        }

        let request = match self.list_request() {
            Ok(request) => request,
            Err(e) => {
                self.state.lock().status = ViewState::Failed(e.clone());
                return Err(e);
            }
        };

        let previous = std::mem::replace(&mut self.state.lock().status, ViewState::Loading);
        let result = self
            .send(request)
            .await
            .and_then(|body| self.parse_list(body));

        let mut state = self.state.lock();
        match result {
            Ok(entities) => {
                info!("Loaded {} {} records", entities.len(), self.schema.resource);
                state.raw = entities.clone();
                state.pending.clear();
                state.status = ViewState::Ready;
                Ok(entities)
            }
            Err(ApiError::Cancelled) => {
                state.status = previous;
                Err(ApiError::Cancelled)
            }
            Err(e) => {
                warn!("Loading {} failed: {e}", self.schema.resource);
                state.status = ViewState::Failed(e.clone());
                Err(e)
            }
        }
    }

    pub async fn refresh(&self) -> ApiResult<Vec<Entity>> {
        self.load().await
    }

    /// Send a mutation and fold the confirmed result into the collection.
    ///
    /// Approve and Reject replace the record's status in place, Delete
    /// removes it, Update overlays the record the server sent back or, when
    /// the server sent none, the submitted payload. On failure the
    /// collection is left exactly as it was.
    ///
    /// # Arguments
    /// * `intent` - Which record, which operation, and the optional payload
    ///
    /// # Returns
    /// * `ApiResult<MutationOutcome>` - The updated record or the removed id
    ///
    /// # Errors
    /// * `Unauthorized` before any I/O when no credential is stored
    /// * `UnsupportedOperation` / `NotFound` before any I/O when the page
    ///   does not offer the operation or does not hold the record
    /// * Any failure the server or transport reports
    pub async fn apply_mutation(&self, intent: MutationIntent) -> ApiResult<MutationOutcome> {
        if self.is_torn_down() {
            return Err(ApiError::Cancelled);
        }
        self.client.bearer()?;
        if !self.schema.supports(intent.operation) {
            return Err(ApiError::UnsupportedOperation {
                resource: self.schema.resource.clone(),
                operation: intent.operation.to_string(),
            });
        }
        self.ensure_present(intent.entity_id)?;

        let id = intent.entity_id;
        let lock = self.entity_lock(id);
        let outcome = {
            let _queued = lock.lock().await;
            self.mutate_exclusive(&intent).await
        };
        drop(lock);
        self.release_entity_lock(id);

        if outcome.is_ok() && self.schema.refetch_after_mutation {
            if let Err(e) = self.load().await {
                warn!("Refetch after {} {id} failed: {e}", intent.operation);
            }
        }
        outcome
    }

    /// Runs with the record's queue slot held.
    async fn mutate_exclusive(&self, intent: &MutationIntent) -> ApiResult<MutationOutcome> {
        // Earlier intents in the queue may have signed out or deleted the record.
        let token = self.client.bearer()?;
        self.ensure_present(intent.entity_id)?;

        self.state.lock().pending.insert(intent.entity_id);
        let result = self.send(self.mutation_request(intent, token)).await;
        let outcome = result.and_then(|body| self.fold(intent, body));
        self.state.lock().pending.remove(&intent.entity_id);

        match &outcome {
            Ok(_) => info!(
                "{} {} {} confirmed",
                intent.operation, self.schema.resource, intent.entity_id
            ),
            Err(e) => warn!(
                "{} {} {} failed: {e}",
                intent.operation, self.schema.resource, intent.entity_id
            ),
        }
        outcome
    }

    fn fold(&self, intent: &MutationIntent, body: Value) -> ApiResult<MutationOutcome> {
        if self.is_torn_down() {
            return Err(ApiError::Cancelled);
        }

        let id = intent.entity_id;
        let mut state = self.state.lock();
        let Some(index) = state.raw.iter().position(|e| e.id() == id) else {
            if intent.operation == MutationOp::Delete {
                return Ok(MutationOutcome::Removed(id));
            }
            return Err(ApiError::NotFound(format!(
                "{} {id} left the list while the request was in flight",
                self.schema.resource
            )));
        };

        match intent.operation {
            MutationOp::Delete => {
                state.raw.remove(index);
                Ok(MutationOutcome::Removed(id))
            }
            MutationOp::Approve | MutationOp::Reject => {
                let entity = &mut state.raw[index];
                if let Some(status) = self.schema.status_after(intent.operation) {
                    entity.set_field(&self.schema.status_field, Value::from(status));
                }
                Ok(MutationOutcome::Updated(entity.clone()))
            }
            MutationOp::Update => {
                let entity = &mut state.raw[index];
                match &body {
                    Value::Object(record) if record.contains_key(&self.schema.id_field) => {
                        debug!("Using server-confirmed record for {id}");
                        entity.merge(record, &self.schema.id_field);
                    }
                    _ => {
                        if let Some(payload) = &intent.payload {
                            entity.merge(payload, &self.schema.id_field);
                        }
                    }
                }
                Ok(MutationOutcome::Updated(entity.clone()))
            }
        }
    }

    fn list_request(&self) -> ApiResult<ApiRequest> {
        let token = self.client.bearer()?;
        let mut request = ApiRequest::get(self.schema.list_path());

        if let Some(claim) = &self.schema.scope_claim {
            let scope_id = extract_scope_id(&token, claim).map_err(|e| {
                self.client.invalidate();
                ApiError::from(e)
            })?;
            request = request.with_query(self.schema.scope_param.as_str(), scope_id);
        }

        request.bearer = Some(token);
        Ok(request)
    }

    fn mutation_request(&self, intent: &MutationIntent, token: String) -> ApiRequest {
        let path = self.schema.mutation_path(intent.operation, intent.entity_id);
        let mut request = match intent.operation {
            MutationOp::Delete => ApiRequest::new(Method::Delete, path),
            MutationOp::Update => {
                let mut body = intent.payload.clone().unwrap_or_default();
                body.insert(self.schema.id_field.clone(), Value::from(intent.entity_id));
                ApiRequest::new(Method::Put, path).with_body(Value::Object(body))
            }
            MutationOp::Approve | MutationOp::Reject => {
                let request = ApiRequest::new(Method::Put, path);
                match &intent.payload {
                    Some(payload) => request.with_body(Value::Object(payload.clone())),
                    None => request,
                }
            }
        };
        request.bearer = Some(token);
        request
    }

    async fn send(&self, request: ApiRequest) -> ApiResult<Value> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
            result = self.client.send(request) => result,
        }
    }

    fn parse_list(&self, body: Value) -> ApiResult<Vec<Entity>> {
        let items = match body {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            Value::Object(mut map) => LIST_KEYS
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| {
                    ApiError::InvalidResponse(format!(
                        "{} list is not an array",
                        self.schema.resource
                    ))
                })?,
            other => {
                return Err(ApiError::InvalidResponse(format!(
                    "{} list is not an array: {other}",
                    self.schema.resource
                )));
            }
        };

        items
            .into_iter()
            .map(|item| Entity::from_value(item, &self.schema.id_field))
            .collect()
    }

    fn ensure_present(&self, id: i64) -> ApiResult<()> {
        if self.state.lock().raw.iter().any(|e| e.id() == id) {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("{} {id}", self.schema.resource)))
        }
    }

    fn entity_lock(&self, id: i64) -> Arc<AsyncMutex<()>> {
        self.entity_locks.lock().entry(id).or_default().clone()
    }

    fn release_entity_lock(&self, id: i64) {
        let mut locks = self.entity_locks.lock();
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }
}
