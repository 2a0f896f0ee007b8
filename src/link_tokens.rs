use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64_URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Signed links stay usable this long after the reminder email goes out.
pub const LINK_TOKEN_TTL_HOURS: i64 = 72;

type HmacSha256 = Hmac<Sha256>;

/// What a link token authorizes. Confirm tokens travel in lower-trust
/// contexts than edit tokens, so the two are never interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Confirm,
    Edit,
}

impl TokenPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::Confirm => "confirm",
            TokenPurpose::Edit => "edit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirm" => Some(TokenPurpose::Confirm),
            "edit" => Some(TokenPurpose::Edit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkTokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("purpose mismatch")]
    WrongPurpose,
    #[error("subject mismatch")]
    WrongSubject,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    pending_order_id: String,
    purpose: TokenPurpose,
    issued_at: i64,
}

fn seal(secret: &[u8], payload_bytes: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload_bytes);
    mac.finalize().into_bytes().to_vec()
}

/// Mints an opaque `payload.signature` token bound to one pending order and
/// one purpose. Nothing is stored server-side; the same inputs always
/// reverify, so an unexpired confirm link survives a failed charge.
pub fn mint_link_token(
    secret: &[u8],
    pending_order_id: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> String {
    let payload = TokenPayload {
        pending_order_id: pending_order_id.to_string(),
        purpose,
        issued_at: now.timestamp(),
    };
    let payload_bytes = serde_json::to_vec(&payload).expect("token payload serializes");
    let signature = seal(secret, &payload_bytes);
    format!(
        "{}.{}",
        B64_URL_SAFE_NO_PAD.encode(&payload_bytes),
        B64_URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Verifies signature, purpose, subject and age, in that order. The
/// signature check is constant-time. Callers surface every failure as
/// "not found" so a probe learns nothing.
pub fn verify_link_token(
    secret: &[u8],
    token: &str,
    purpose: TokenPurpose,
    pending_order_id: &str,
    now: DateTime<Utc>,
) -> Result<(), LinkTokenError> {
    let (payload_b64, signature_b64) =
        token.split_once('.').ok_or(LinkTokenError::Malformed)?;
    let payload_bytes = B64_URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| LinkTokenError::Malformed)?;
    let signature = B64_URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| LinkTokenError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(&payload_bytes);
    mac.verify_slice(&signature)
        .map_err(|_| LinkTokenError::BadSignature)?;

    let payload: TokenPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| LinkTokenError::Malformed)?;

    if payload.purpose != purpose {
        return Err(LinkTokenError::WrongPurpose);
    }
    if payload.pending_order_id != pending_order_id {
        return Err(LinkTokenError::WrongSubject);
    }

    let age_secs = now.timestamp() - payload.issued_at;
    if age_secs > LINK_TOKEN_TTL_HOURS * 3600 {
        return Err(LinkTokenError::Expired);
    }

    Ok(())
}
