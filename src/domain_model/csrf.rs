use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use super::SessionError;

/// Length of the raw CSRF secret in bytes.
pub const CSRF_LENGTH: usize = 32;

/// Double-submit CSRF secret. The raw secret stays server-side (stored
/// base64-encoded next to the tokens); clients only ever see a masked
/// representation that changes on every render: a fresh one-time pad is drawn
/// and the client receives `base64(pad ++ (secret XOR pad))`.
#[derive(Debug, Clone)]
pub struct CsrfToken {
    encoded: String,
    token: String,
}

impl CsrfToken {
    pub fn new() -> Self {
        let mut raw = [0u8; CSRF_LENGTH];
        OsRng.fill_bytes(&mut raw);
        Self {
            encoded: B64.encode(raw),
            token: mask(&raw),
        }
    }

    /// Rebuild from the base64 secret held in the store. Produces a fresh
    /// masked `token` for the client.
    pub fn from_encoded(encoded: impl Into<String>) -> Result<Self, SessionError> {
        let encoded = encoded.into();
        let raw = B64
            .decode(&encoded)
            .map_err(|_| SessionError::Unauthorized("malformed csrf secret".to_string()))?;
        Ok(Self {
            token: mask(&raw),
            encoded,
        })
    }

    /// The base64-encoded raw secret, as persisted in the token store.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The masked one-time representation handed to the client.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Accepts either an unmasked secret (length L) or a masked one (2L).
    /// Never panics; anything malformed is simply invalid.
    pub fn valid_authenticity_token(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        let Ok(masked) = B64.decode(candidate) else {
            return false;
        };
        let Ok(raw) = B64.decode(&self.encoded) else {
            return false;
        };

        if masked.len() == CSRF_LENGTH {
            secure_compare(&masked, &raw)
        } else if masked.len() == CSRF_LENGTH * 2 {
            let (pad, enciphered) = masked.split_at(CSRF_LENGTH);
            let unmasked: Vec<u8> = pad.iter().zip(enciphered).map(|(p, c)| p ^ c).collect();
            secure_compare(&unmasked, &raw)
        } else {
            false
        }
    }
}

impl Default for CsrfToken {
    fn default() -> Self {
        Self::new()
    }
}

fn mask(raw: &[u8]) -> String {
    let mut pad = [0u8; CSRF_LENGTH];
    OsRng.fill_bytes(&mut pad);
    let mut out = Vec::with_capacity(CSRF_LENGTH * 2);
    out.extend_from_slice(&pad);
    out.extend(raw.iter().zip(pad.iter()).map(|(b, p)| b ^ p));
    B64.encode(out)
}

/// Constant time for equal-length inputs. A length mismatch returns early,
/// which is fine at this layer: candidate lengths are not secret.
fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_token_differs_on_every_render() {
        let csrf = CsrfToken::new();
        let again = CsrfToken::from_encoded(csrf.encoded()).unwrap();
        assert_ne!(csrf.token(), again.token());
        assert!(csrf.valid_authenticity_token(csrf.token()));
        assert!(csrf.valid_authenticity_token(again.token()));
    }

    #[test]
    fn accepts_unmasked_raw_secret() {
        let csrf = CsrfToken::new();
        // the encoded form is base64 of the raw 32-byte secret
        assert!(csrf.valid_authenticity_token(csrf.encoded()));
    }

    #[test]
    fn rejects_corrupted_and_truncated_candidates() {
        let csrf = CsrfToken::new();
        let other = CsrfToken::new();

        assert!(!csrf.valid_authenticity_token(""));
        assert!(!csrf.valid_authenticity_token("not-base64!!!"));
        assert!(!csrf.valid_authenticity_token(other.token()));

        let truncated = &csrf.token()[..csrf.token().len() / 2];
        assert!(!csrf.valid_authenticity_token(truncated));
    }
}
