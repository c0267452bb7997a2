//! Opaque subtitle token codec.
//!
//! A token is the only identity that crosses the engine/client boundary:
//! the internal reference needed to later fetch one chosen candidate,
//! encoded as URL-safe unpadded base64 over compact JSON. Tokens never
//! embed secrets, only provider-addressable references.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything a provider needs to download one specific candidate.
///
/// `extra` is a sorted map so the encoded form is canonical: for any valid
/// payload, `decode(encode(p)) == p` byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TokenPayload {
    pub provider: String,
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Failure decoding a client-supplied token.
///
/// Tokens arrive on the download path straight from clients, so malformed
/// input must map to a dedicated error, never an unhandled panic.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload is not valid: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Encode a payload into an opaque URL-safe token with no padding.
pub fn encode(payload: &TokenPayload) -> String {
    let raw = serde_json::to_vec(payload).expect("token payload serializes");
    URL_SAFE_NO_PAD.encode(raw)
}

/// Decode a client-supplied token back into its payload.
pub fn decode(token: &str) -> Result<TokenPayload, DecodeError> {
    let raw = URL_SAFE_NO_PAD.decode(token.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payload() -> TokenPayload {
        TokenPayload {
            provider: "unacs".to_string(),
            reference: "https://example.org/download/42".to_string(),
            format: Some("srt".to_string()),
            fps: Some(25.0),
            extra: BTreeMap::from([("file_id".to_string(), "42".to_string())]),
        }
    }

    #[test]
    fn test_roundtrip() {
        let payload = make_payload();
        let token = encode(&payload);
        assert_eq!(decode(&token).unwrap(), payload);
    }

    #[test]
    fn test_roundtrip_minimal_payload() {
        let payload = TokenPayload {
            provider: "subsland".to_string(),
            reference: "ref-1".to_string(),
            ..Default::default()
        };
        let token = encode(&payload);
        assert_eq!(decode(&token).unwrap(), payload);
    }

    #[test]
    fn test_token_is_url_safe_and_unpadded() {
        let token = encode(&make_payload());
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let payload = make_payload();
        assert_eq!(encode(&payload), encode(&payload));
    }

    #[test]
    fn test_decode_tolerates_client_added_padding() {
        let payload = make_payload();
        let token = format!("{}==", encode(&payload));
        assert_eq!(decode(&token).unwrap(), payload);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("!!!not-base64!!!"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_rejects_non_json_payload() {
        let token = URL_SAFE_NO_PAD.encode(b"just some text");
        assert!(matches!(decode(&token), Err(DecodeError::Payload(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let token = URL_SAFE_NO_PAD.encode(br#"{"unexpected":"shape"}"#);
        assert!(matches!(decode(&token), Err(DecodeError::Payload(_))));
    }
}
