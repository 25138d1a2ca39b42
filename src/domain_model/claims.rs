use chrono::Utc;
use serde_json::Value;

use super::{SessionError, TokenType};

/// Arbitrary caller-supplied token payload. Reserved keys (`id`, `exp`,
/// `ruid`) are merged in by the token entities before signing.
pub type Claims = serde_json::Map<String, Value>;

/// Claim carrying the token's own random id.
pub const CLAIM_ID: &str = "id";
/// Expiration claim, epoch seconds.
pub const CLAIM_EXP: &str = "exp";
/// On access tokens: the id of the refresh token it was minted with.
/// Present only when sliding renewal is enabled.
pub const CLAIM_RUID: &str = "ruid";

pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

pub fn claim_str<'a>(claims: &'a Claims, key: &str) -> Option<&'a str> {
    claims.get(key).and_then(Value::as_str)
}

/// Missing fields in an otherwise decodable payload are a contract violation,
/// not a forged token, hence `InvalidPayload` rather than `Unauthorized`.
pub fn required_claim<'a>(
    claims: &'a Claims,
    token_type: TokenType,
    key: &str,
    field: &'static str,
) -> Result<&'a str, SessionError> {
    claim_str(claims, key).ok_or(SessionError::InvalidPayload { token_type, field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_claim_reports_payload_shape_errors() {
        let mut claims = Claims::new();
        claims.insert("id".to_string(), json!("abc"));

        assert_eq!(
            required_claim(&claims, TokenType::Access, "id", "token id").unwrap(),
            "abc"
        );
        let err = required_claim(&claims, TokenType::Access, "ruid", "refresh id").unwrap_err();
        assert!(matches!(err, SessionError::InvalidPayload { .. }));
        assert!(!err.is_unauthorized());
    }
}
