//! Bearer credential decoding.
//!
//! The backend issues JWTs. The client never verifies signatures; it only
//! reads claims to decide how to scope requests and which pages to offer.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Claim carrying the acting cashier's account id.
pub const CASHIER_ID_CLAIM: &str = "cashierId";

/// Claim names a role may be issued under, short form first.
const ROLE_CLAIMS: [&str; 2] = [
    "role",
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
];

const NAME_CLAIMS: [&str; 3] = ["unique_name", "name", "sub"];

/// base64url that accepts payloads with or without trailing padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("no credential present")]
    Missing,

    #[error("expected 3 dot-separated segments, found {0}")]
    SegmentCount(usize),

    #[error("payload is not base64url: {0}")]
    Encoding(String),

    #[error("payload is not a JSON object: {0}")]
    Json(String),

    #[error("claim `{0}` is missing")]
    MissingClaim(String),

    #[error("claim `{0}` is not an integer")]
    InvalidClaim(String),
}

/// Decoded payload of a bearer credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    raw: Map<String, Value>,
}

impl Claims {
    /// Decode the payload segment of `token`.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::SegmentCount(segments.len()));
        }

        let bytes = URL_SAFE_LENIENT
            .decode(segments[1])
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(raw)) => Ok(Self { raw }),
            Ok(other) => Err(TokenError::Json(format!("found {other}"))),
            Err(e) => Err(TokenError::Json(e.to_string())),
        }
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.raw.get(claim)
    }

    /// Read `claim` as an integer id. Numeric strings are accepted since
    /// some issuers stringify every claim.
    pub fn integer(&self, claim: &str) -> Result<i64, TokenError> {
        let value = self
            .raw
            .get(claim)
            .ok_or_else(|| TokenError::MissingClaim(claim.to_string()))?;

        let id = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        id.ok_or_else(|| TokenError::InvalidClaim(claim.to_string()))
    }

    pub fn role(&self) -> Option<&str> {
        ROLE_CLAIMS
            .iter()
            .find_map(|claim| self.raw.get(*claim).and_then(Value::as_str))
    }

    pub fn display_name(&self) -> Option<&str> {
        NAME_CLAIMS
            .iter()
            .find_map(|claim| self.raw.get(*claim).and_then(Value::as_str))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let seconds = self.raw.get("exp").and_then(Value::as_i64)?;
        DateTime::from_timestamp(seconds, 0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }
}

/// Extract the scoping id carried by a bearer credential.
///
/// Decodes the middle segment of a three-part dot-delimited token as
/// base64url JSON and reads `claim` from it. Performs no I/O.
///
/// # Arguments
/// * `token` - The raw bearer credential
/// * `claim` - Name of the claim holding the id, e.g. [`CASHIER_ID_CLAIM`]
///
/// # Returns
/// * `Result<i64, TokenError>` - The id, or why the credential is malformed
///
/// # Examples
/// ```
/// use brewdesk::token::{extract_scope_id, TokenError, CASHIER_ID_CLAIM};
///
/// assert_eq!(extract_scope_id("", CASHIER_ID_CLAIM), Err(TokenError::Missing));
/// ```
pub fn extract_scope_id(token: &str, claim: &str) -> Result<i64, TokenError> {
    Claims::decode(token)?.integer(claim)
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    use super::*;

    fn make_test_jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"HS256\",\"typ\":\"JWT\"}");
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let signature = URL_SAFE_NO_PAD.encode(b"sig");
        format!("{header}.{payload}.{signature}")
    }

    #[test]
    fn extracts_numeric_and_string_claims() {
        let jwt = make_test_jwt(serde_json::json!({ "cashierId": 42 }));
        assert_eq!(extract_scope_id(&jwt, CASHIER_ID_CLAIM), Ok(42));

        let jwt = make_test_jwt(serde_json::json!({ "cashierId": "17" }));
        assert_eq!(extract_scope_id(&jwt, CASHIER_ID_CLAIM), Ok(17));
    }

    #[test]
    fn accepts_padded_payloads() {
        let header = URL_SAFE.encode(b"{}");
        let payload = URL_SAFE.encode(b"{\"cashierId\":5}");
        let jwt = format!("{header}.{payload}.sig");
        assert_eq!(extract_scope_id(&jwt, CASHIER_ID_CLAIM), Ok(5));
    }

    #[test]
    fn rejects_empty_and_wrong_segment_counts() {
        assert_eq!(extract_scope_id("", CASHIER_ID_CLAIM), Err(TokenError::Missing));
        assert_eq!(
            extract_scope_id("only.two", CASHIER_ID_CLAIM),
            Err(TokenError::SegmentCount(2))
        );
        assert_eq!(
            extract_scope_id("a.b.c.d", CASHIER_ID_CLAIM),
            Err(TokenError::SegmentCount(4))
        );
    }

    #[test]
    fn rejects_payload_that_is_not_base64_json() {
        let result = extract_scope_id("head.!!not-base64!!.sig", CASHIER_ID_CLAIM);
        assert!(matches!(result, Err(TokenError::Encoding(_))));

        let not_json = URL_SAFE_NO_PAD.encode(b"cashierId=3");
        let result = extract_scope_id(&format!("h.{not_json}.s"), CASHIER_ID_CLAIM);
        assert!(matches!(result, Err(TokenError::Json(_))));

        let array = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        let result = extract_scope_id(&format!("h.{array}.s"), CASHIER_ID_CLAIM);
        assert!(matches!(result, Err(TokenError::Json(_))));
    }

    #[test]
    fn rejects_missing_or_non_integer_claim() {
        let jwt = make_test_jwt(serde_json::json!({ "role": "Cashier" }));
        assert_eq!(
            extract_scope_id(&jwt, CASHIER_ID_CLAIM),
            Err(TokenError::MissingClaim("cashierId".into()))
        );

        let jwt = make_test_jwt(serde_json::json!({ "cashierId": "abc" }));
        assert_eq!(
            extract_scope_id(&jwt, CASHIER_ID_CLAIM),
            Err(TokenError::InvalidClaim("cashierId".into()))
        );
    }

    #[test]
    fn reads_role_name_and_expiry() {
        let jwt = make_test_jwt(serde_json::json!({
            "http://schemas.microsoft.com/ws/2008/06/identity/claims/role": "Admin",
            "unique_name": "maria",
            "exp": 1_700_000_000
        }));
        let claims = Claims::decode(&jwt).unwrap();

        assert_eq!(claims.role(), Some("Admin"));
        assert_eq!(claims.display_name(), Some("maria"));
        let exp = claims.expires_at().unwrap();
        assert_eq!(exp.timestamp(), 1_700_000_000);
        assert!(claims.is_expired(exp));
        assert!(!claims.is_expired(DateTime::from_timestamp(1_600_000_000, 0).unwrap()));
    }
}
