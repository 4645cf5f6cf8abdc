/// Refresh token generation and state.
///
/// A refresh token is an opaque bearer secret: base64 of 64 bytes drawn
/// from the OS random source. Its record is append-only; `revoked_at`,
/// `revoked_by_ip` and `replaced_by_token` are set at most once and never
/// cleared, so the chain of rotations stays auditable and a replayed
/// (already-replaced) token remains detectable.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

const REFRESH_TOKEN_BYTES: usize = 64;
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// One issuance in a rotation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    /// The bearer secret. Write-once, globally unique.
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Network origin of the request that produced this token (audit only).
    pub created_by_ip: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    /// Set only when invalidation happened via rotation; points at the
    /// successor's `value`. Stays `None` for explicit revocation.
    pub replaced_by_token: Option<String>,
}

impl RefreshToken {
    /// A token is active while it is unrevoked and unexpired. Expiry is
    /// detected lazily here, at lookup time.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Generate a fresh refresh token valid for 7 days.
pub fn generate_refresh_token(ip_address: &str) -> RefreshToken {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);

    let now = Utc::now();
    RefreshToken {
        value: BASE64.encode(bytes),
        created_at: now,
        expires_at: now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
        created_by_ip: ip_address.to_string(),
        revoked_at: None,
        revoked_by_ip: None,
        replaced_by_token: None,
    }
}
