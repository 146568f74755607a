//! Webhook handshake and HMAC signature check.
//!
//! A webhook starts unconfirmed. The first request carrying `X-Hook-Secret`
//! establishes the shared secret; from then on every delivery must carry
//! `X-Hook-Signature`, the hex HMAC-SHA256 of the raw body keyed by that secret.

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::AppError;
use crate::store::Webhook;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_HEADER: &str = "X-Hook-Secret";
pub const SIGNATURE_HEADER: &str = "X-Hook-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Neither handshake nor signature header
    MissingHeaders,
    /// Handshake attempted on an already confirmed webhook
    SecretAlreadySet,
    /// Signature presented but the handshake never happened
    NoSecretOnFile,
    SignatureMismatch,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::NoSecretOnFile => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::MissingHeaders => "missing_headers",
            Rejection::SecretAlreadySet => "secret_already_set",
            Rejection::NoSecretOnFile => "no_secret_on_file",
            Rejection::SignatureMismatch => "signature_mismatch",
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::MissingHeaders => AppError::InvalidRequest(format!(
                "Missing {SECRET_HEADER} or {SIGNATURE_HEADER} header"
            )),
            Rejection::SecretAlreadySet => {
                AppError::SecurityViolation("handshake on a confirmed webhook".to_string())
            }
            Rejection::NoSecretOnFile => {
                AppError::Misconfiguration("Webhook has no secret on file".to_string())
            }
            Rejection::SignatureMismatch => {
                AppError::SecurityViolation("signature mismatch".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Store `secret` and echo it back
    HandshakeAccepted { secret: String },
    SignatureValid,
    Rejected {
        reason: Rejection,
        http_status: StatusCode,
    },
}

impl Verification {
    fn rejected(reason: Rejection) -> Self {
        Verification::Rejected {
            reason,
            http_status: reason.status(),
        }
    }
}

/// Decide what to do with a delivery. Performs no I/O.
pub fn verify(webhook: &Webhook, headers: &HeaderMap, body: &[u8]) -> Verification {
    if let Some(secret) = header(headers, SECRET_HEADER) {
        if webhook.is_confirmed() {
            return Verification::rejected(Rejection::SecretAlreadySet);
        }
        return Verification::HandshakeAccepted {
            secret: secret.to_string(),
        };
    }

    let Some(signature) = header(headers, SIGNATURE_HEADER) else {
        return Verification::rejected(Rejection::MissingHeaders);
    };
    let Some(secret) = webhook.secret.as_deref().filter(|s| !s.is_empty()) else {
        return Verification::rejected(Rejection::NoSecretOnFile);
    };

    if signature_matches(secret, body, signature) {
        Verification::SignatureValid
    } else {
        Verification::rejected(Rejection::SignatureMismatch)
    }
}

/// Hex HMAC-SHA256 of `body` keyed by `secret`
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = keyed(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn signature_matches(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = keyed(secret);
    mac.update(body);
    // constant time
    mac.verify_slice(&expected).is_ok()
}

fn keyed(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key length")
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderName, HeaderValue};

    use super::*;
    use crate::store::ResourceType;

    const BODY: &[u8] = br#"{"events": [{"glitch": "in matrix"}]}"#;
    const SIGNATURE: &str = "56302af223b5cfad770ff07469189e5a2ac961bf77ac6fcf000ae75c619af3d7";

    fn webhook(secret: Option<&str>) -> Webhook {
        Webhook {
            id: "w1".into(),
            external_id: Some("1".into()),
            path: "/asana/projects".into(),
            resource_type: ResourceType::Project,
            secret: secret.map(str::to_string),
            project_id: None,
        }
    }

    fn headers(name: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn test_known_signature() {
        assert_eq!(sign("pork_fillet", BODY), SIGNATURE);
        assert_eq!(
            verify(&webhook(Some("pork_fillet")), &headers(SIGNATURE_HEADER, SIGNATURE), BODY),
            Verification::SignatureValid
        );
    }

    #[test]
    fn test_signature_is_over_raw_bytes() {
        // same JSON, different whitespace
        let compact = br#"{"events":[{"glitch":"in matrix"}]}"#;
        assert_eq!(
            verify(&webhook(Some("pork_fillet")), &headers(SIGNATURE_HEADER, SIGNATURE), compact),
            Verification::rejected(Rejection::SignatureMismatch)
        );
    }

    #[test]
    fn test_handshake_on_unconfirmed_webhook() {
        assert_eq!(
            verify(&webhook(None), &headers(SECRET_HEADER, "s3cret"), b""),
            Verification::HandshakeAccepted {
                secret: "s3cret".into()
            }
        );
        // empty stored secret counts as unconfirmed
        assert!(matches!(
            verify(&webhook(Some("")), &headers(SECRET_HEADER, "s3cret"), b""),
            Verification::HandshakeAccepted { .. }
        ));
    }

    #[test]
    fn test_second_handshake_rejected() {
        let verdict = verify(&webhook(Some("first")), &headers(SECRET_HEADER, "second"), b"");
        assert_eq!(
            verdict,
            Verification::Rejected {
                reason: Rejection::SecretAlreadySet,
                http_status: StatusCode::BAD_REQUEST
            }
        );
    }

    #[test]
    fn test_missing_headers() {
        assert_eq!(
            verify(&webhook(Some("pork_fillet")), &HeaderMap::new(), BODY),
            Verification::rejected(Rejection::MissingHeaders)
        );
        // empty values count as absent
        assert_eq!(
            verify(&webhook(Some("pork_fillet")), &headers(SIGNATURE_HEADER, ""), BODY),
            Verification::rejected(Rejection::MissingHeaders)
        );
    }

    #[test]
    fn test_signature_without_secret_is_misconfiguration() {
        let verdict = verify(&webhook(None), &headers(SIGNATURE_HEADER, SIGNATURE), BODY);
        assert_eq!(
            verdict,
            Verification::Rejected {
                reason: Rejection::NoSecretOnFile,
                http_status: StatusCode::INTERNAL_SERVER_ERROR
            }
        );
    }

    #[test]
    fn test_garbage_signature_is_mismatch() {
        assert_eq!(
            verify(&webhook(Some("pork_fillet")), &headers(SIGNATURE_HEADER, "not-hex"), BODY),
            Verification::rejected(Rejection::SignatureMismatch)
        );
    }

    #[test]
    fn test_secret_header_wins_over_signature() {
        let mut both = headers(SECRET_HEADER, "s3cret");
        both.insert(
            HeaderName::from_bytes(SIGNATURE_HEADER.as_bytes()).unwrap(),
            HeaderValue::from_static("abcd"),
        );
        assert!(matches!(
            verify(&webhook(None), &both, BODY),
            Verification::HandshakeAccepted { .. }
        ));
    }
}
