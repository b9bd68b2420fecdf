#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use brewdesk::{
    ApiClient, ApiError, ApiRequest, ApiResult, CredentialProvider, MemoryCredentialStore,
    RawResponse, Transport,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;

/// Scripted in-memory backend that records every request it sees.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<ApiResult<RawResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: impl Into<String>) {
        self.responses
            .lock()
            .push_back(Ok(RawResponse::new(status, body)));
    }

    pub fn fail(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(ApiError::Network(message.to_string())));
    }

    /// Hold the next request open until the returned sender fires or drops.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &ApiRequest) -> ApiResult<RawResponse> {
        self.requests.lock().push(request.clone());

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::new(500, "no scripted response")))
    }
}

pub fn make_jwt(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"HS256\",\"typ\":\"JWT\"}");
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{header}.{payload}.c2ln")
}

pub fn cashier_token(cashier_id: i64) -> String {
    make_jwt(json!({ "cashierId": cashier_id, "role": "Cashier", "unique_name": "ben" }))
}

pub fn admin_token() -> String {
    make_jwt(json!({ "role": "Admin", "unique_name": "ana" }))
}

/// A client over `transport`, optionally already signed in with `token`.
pub fn client_with(
    transport: &Arc<MockTransport>,
    token: Option<&str>,
) -> (ApiClient, Arc<MemoryCredentialStore>) {
    let store = Arc::new(match token {
        Some(token) => MemoryCredentialStore::with_token(token),
        None => MemoryCredentialStore::new(),
    });
    let credentials: Arc<dyn CredentialProvider> = store.clone();
    let client = ApiClient::new(transport.clone(), credentials);
    (client, store)
}

pub fn accounts_json() -> String {
    json!([
        { "id": 3, "username": "ana", "firstName": "Ana", "role": "Admin",
          "status": "Approved", "branch": { "branchName": "Downtown" } },
        { "id": 5, "username": "ben", "firstName": "Ben", "role": "Cashier",
          "status": "Pending", "branch": { "branchName": "Harbor" } },
        { "id": 8, "username": "cora", "firstName": "Cora", "role": "Staff",
          "status": "Pending", "branch": { "branchName": "Downtown" } }
    ])
    .to_string()
}
