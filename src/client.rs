use std::sync::Arc;

use log::{info, warn};
use serde_json::{Value, json};

use crate::credential::CredentialProvider;
use crate::error::{ApiError, ApiResult};
use crate::transport::{ApiRequest, Method, Transport};

const LOGIN_PATH: &str = "Auth/Login";

/// Keys a login response may carry the issued token under.
const TOKEN_KEYS: [&str; 3] = ["token", "accessToken", "access_token"];

/// Authenticated gateway to the back-office API.
///
/// Attaches the current credential to every request and turns raw HTTP
/// responses into values or [`ApiError`]s. A 401 from any request clears
/// the credential store.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    /// The stored credential, or `Unauthorized` when there is none.
    pub fn bearer(&self) -> ApiResult<String> {
        self.credentials
            .get()
            .filter(|token| !token.is_empty())
            .ok_or(ApiError::Unauthorized)
    }

    /// Send `request` and classify the response.
    ///
    /// # Arguments
    /// * `request` - The request; its bearer is filled from the store if unset
    ///
    /// # Returns
    /// * `ApiResult<Value>` - The JSON body on 2xx. A plain-text body becomes
    ///   `{"message": <text>}` and an empty body becomes `null`.
    ///
    /// # Errors
    /// * `Unauthorized` on 401, after clearing the credential store
    /// * `Forbidden`, `NotFound`, `Conflict` or `Server` for other statuses
    /// * `Network` when no response arrived
    pub async fn send(&self, mut request: ApiRequest) -> ApiResult<Value> {
        if request.bearer.is_none() {
            request.bearer = self.credentials.get();
        }

        let response = self.transport.execute(&request).await?;

        if response.is_success() {
            return Ok(parse_success_body(&response.body));
        }

        let err = ApiError::from_status(response.status, &response.body);
        if err == ApiError::Unauthorized {
            self.invalidate();
        }
        warn!("{} {} failed: {err}", request.method, request.path);
        Err(err)
    }

    /// Drop the stored credential after the server rejected it.
    pub fn invalidate(&self) {
        if let Err(e) = self.credentials.clear() {
            warn!("Failed to clear credential store: {e}");
        }
    }

    /// Exchange a username and password for a credential and store it.
    ///
    /// # Returns
    /// * `ApiResult<String>` - The issued token
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<String> {
        let request = ApiRequest::new(Method::Post, LOGIN_PATH)
            .with_body(json!({ "username": username, "password": password }));

        let body = self.send(request).await?;
        let token = TOKEN_KEYS
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .or_else(|| body.get("message").and_then(Value::as_str))
            .or_else(|| body.as_str())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("login response carried no token".into()))?
            .to_string();

        self.credentials.set(&token).map_err(|e| {
            ApiError::InvalidResponse(format!("could not store credential: {e}"))
        })?;
        info!("Signed in as {username}");
        Ok(token)
    }

    pub fn logout(&self) {
        self.invalidate();
        info!("Signed out");
    }
}

fn parse_success_body(body: &str) -> Value {
    let text = body.trim();
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "message": text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_tolerates_plain_text() {
        assert_eq!(parse_success_body(""), Value::Null);
        assert_eq!(parse_success_body("[1]"), json!([1]));
        assert_eq!(
            parse_success_body("Account approved"),
            json!({ "message": "Account approved" })
        );
    }
}
