use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Deserialize;
use serde_json::json;

use crate::domain_model::{CLAIM_EXP, Claims, SessionError, now_epoch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SigningAlgorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS512,
    /// Unsigned tokens for environments that don't require cryptographic
    /// validation. Claims are still checked on decode.
    #[serde(rename = "none")]
    None,
}

/// Key material matching the configured algorithm.
pub enum KeyMaterial {
    /// Shared secret for the HMAC family.
    Secret(Vec<u8>),
    /// PEM-encoded RSA pair.
    RsaPem {
        private_pem: Vec<u8>,
        public_pem: Vec<u8>,
    },
    None,
}

/// Registered-claim checks applied on decode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyOptions {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub subject: Option<String>,
    #[serde(default)]
    pub leeway: u64,
}

/// Signs and verifies a claims map as a compact JWT. Expiry enforcement here
/// is one of the two layers; the token store's TTL is the other.
pub struct JwtCodec {
    algorithm: SigningAlgorithm,
    encoding_key: Option<EncodingKey>,
    decoding_key: Option<DecodingKey>,
    options: VerifyOptions,
}

impl JwtCodec {
    pub fn new(
        algorithm: SigningAlgorithm,
        key: KeyMaterial,
        options: VerifyOptions,
    ) -> Result<Self, SessionError> {
        let (encoding_key, decoding_key) = match (algorithm, key) {
            (SigningAlgorithm::None, _) => (None, None),
            (
                SigningAlgorithm::HS256 | SigningAlgorithm::HS384 | SigningAlgorithm::HS512,
                KeyMaterial::Secret(secret),
            ) => (
                Some(EncodingKey::from_secret(&secret)),
                Some(DecodingKey::from_secret(&secret)),
            ),
            (
                SigningAlgorithm::RS256 | SigningAlgorithm::RS512,
                KeyMaterial::RsaPem {
                    private_pem,
                    public_pem,
                },
            ) => {
                let enc = EncodingKey::from_rsa_pem(&private_pem)
                    .map_err(|e| SessionError::Malconfigured(format!("private key: {e}")))?;
                let dec = DecodingKey::from_rsa_pem(&public_pem)
                    .map_err(|e| SessionError::Malconfigured(format!("public key: {e}")))?;
                (Some(enc), Some(dec))
            }
            (algorithm, _) => {
                return Err(SessionError::Malconfigured(format!(
                    "key material does not match algorithm {algorithm:?}"
                )));
            }
        };

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
            options,
        })
    }

    /// Convenience constructor for the HMAC default.
    pub fn hmac(algorithm: SigningAlgorithm, secret: impl Into<Vec<u8>>) -> Result<Self, SessionError> {
        Self::new(
            algorithm,
            KeyMaterial::Secret(secret.into()),
            VerifyOptions::default(),
        )
    }

    pub fn unsigned() -> Self {
        Self {
            algorithm: SigningAlgorithm::None,
            encoding_key: None,
            decoding_key: None,
            options: VerifyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, SessionError> {
        match self.signed_algorithm() {
            Some(alg) => {
                let key = self
                    .encoding_key
                    .as_ref()
                    .ok_or_else(|| SessionError::Malconfigured("private key is not specified".to_string()))?;
                encode(&Header::new(alg), claims, key)
                    .map_err(|e| SessionError::Malconfigured(e.to_string()))
            }
            None => encode_unsigned(claims),
        }
    }

    /// Verifies signature, expiry and the registered claims. Per-call
    /// `claims` override the codec-level verification options.
    pub fn decode(
        &self,
        token: &str,
        claims: Option<&VerifyOptions>,
    ) -> Result<Claims, SessionError> {
        let options = claims.unwrap_or(&self.options);
        match self.signed_algorithm() {
            Some(alg) => {
                let key = self
                    .decoding_key
                    .as_ref()
                    .ok_or_else(|| SessionError::Malconfigured("public key is not specified".to_string()))?;
                let mut validation = Validation::new(alg);
                validation.leeway = options.leeway;
                if let Some(iss) = &options.issuer {
                    validation.set_issuer(&[iss]);
                }
                match &options.audience {
                    Some(aud) => validation.set_audience(&[aud]),
                    None => validation.validate_aud = false,
                }
                if let Some(sub) = &options.subject {
                    validation.sub = Some(sub.clone());
                }
                let data = decode::<Claims>(token, key, &validation).map_err(map_decode_error)?;
                Ok(data.claims)
            }
            None => {
                let payload = decode_segments(token)?;
                verify_claims(&payload, options)?;
                Ok(payload)
            }
        }
    }

    /// Structural decode only: no signature, no expiry. Used to read the
    /// payload of an already-trusted but possibly expired access token.
    pub fn decode_unsafe(&self, token: &str) -> Result<Claims, SessionError> {
        decode_segments(token)
    }

    fn signed_algorithm(&self) -> Option<Algorithm> {
        match self.algorithm {
            SigningAlgorithm::HS256 => Some(Algorithm::HS256),
            SigningAlgorithm::HS384 => Some(Algorithm::HS384),
            SigningAlgorithm::HS512 => Some(Algorithm::HS512),
            SigningAlgorithm::RS256 => Some(Algorithm::RS256),
            SigningAlgorithm::RS512 => Some(Algorithm::RS512),
            SigningAlgorithm::None => None,
        }
    }
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> SessionError {
    match e.kind() {
        ErrorKind::ExpiredSignature => SessionError::Unauthorized("token expired".to_string()),
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature => SessionError::ClaimsVerification(e.to_string()),
        _ => SessionError::Decode(e.to_string()),
    }
}

fn encode_unsigned(claims: &Claims) -> Result<String, SessionError> {
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "none", "typ": "JWT" }).to_string());
    let payload = serde_json::to_string(claims)
        .map_err(|e| SessionError::Malconfigured(e.to_string()))?;
    Ok(format!("{header}.{}.", URL_SAFE_NO_PAD.encode(payload)))
}

fn decode_segments(token: &str) -> Result<Claims, SessionError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
        return Err(SessionError::Decode("cannot decode the token".to_string()));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| SessionError::Decode(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| SessionError::Decode(e.to_string()))
}

fn verify_claims(claims: &Claims, options: &VerifyOptions) -> Result<(), SessionError> {
    let exp = claims
        .get(CLAIM_EXP)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| SessionError::Decode("missing exp claim".to_string()))?;
    if exp + options.leeway as i64 <= now_epoch() {
        return Err(SessionError::Unauthorized("token expired".to_string()));
    }
    for (claim, expected) in [
        ("iss", &options.issuer),
        ("aud", &options.audience),
        ("sub", &options.subject),
    ] {
        if let Some(expected) = expected {
            let actual = claims.get(claim).and_then(serde_json::Value::as_str);
            if actual != Some(expected.as_str()) {
                return Err(SessionError::ClaimsVerification(format!(
                    "invalid {claim} claim"
                )));
            }
        }
    }
    Ok(())
}
