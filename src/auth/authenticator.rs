//! Presented-credential verification.

use std::net::IpAddr;

use subtle::ConstantTimeEq;

use crate::auth::credentials::{hash_token, parse_token, ApiKey, CredentialStore, Role};
use crate::config::AuthConfig;
use crate::observability::metrics;

/// Compared against when the presented id is unknown, so the miss path
/// costs the same hash-and-compare as the hit path.
const DUMMY_HASH: &str = "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// Why a presented credential was refused. Only ever logged; clients see a
/// uniform 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    Malformed,
    UnknownKey,
    BadSecret,
    Revoked,
    InsufficientRole { required: Role, actual: Role },
}

impl ForbiddenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForbiddenReason::Malformed => "malformed",
            ForbiddenReason::UnknownKey => "unknown_key",
            ForbiddenReason::BadSecret => "bad_secret",
            ForbiddenReason::Revoked => "revoked",
            ForbiddenReason::InsufficientRole { .. } => "insufficient_role",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no credential presented")]
    Unauthenticated,
    #[error("credential rejected ({})", .0.as_str())]
    Forbidden(ForbiddenReason),
}

/// Who a request is acting as once authentication has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Key(ApiKey),
    /// Authentication disabled; identified by client address only.
    Anonymous { client: IpAddr },
}

impl Principal {
    /// Rate-limit identity.
    pub fn identity(&self) -> String {
        match self {
            Principal::Key(key) => format!("key:{}", key.id),
            Principal::Anonymous { client } => format!("ip:{}", client),
        }
    }

    pub fn key_id(&self) -> Option<&str> {
        match self {
            Principal::Key(key) => Some(&key.id),
            Principal::Anonymous { .. } => None,
        }
    }

    pub fn rate_limit_override(&self) -> Option<u32> {
        match self {
            Principal::Key(key) => key.rate_limit_per_minute,
            Principal::Anonymous { .. } => None,
        }
    }
}

/// Validates presented keys against the [`CredentialStore`].
pub struct Authenticator {
    store: CredentialStore,
    enabled: bool,
}

impl Authenticator {
    pub fn new(store: CredentialStore, config: &AuthConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Authenticate a request.
    ///
    /// With authentication disabled every non-admin request is admitted as
    /// [`Principal::Anonymous`]; admin routes always require a real key.
    pub fn authenticate(
        &self,
        presented: Option<&str>,
        required: Option<Role>,
        client: IpAddr,
    ) -> Result<Principal, AuthError> {
        if !self.enabled && required != Some(Role::Admin) {
            return Ok(Principal::Anonymous { client });
        }

        let result = self.verify(presented).and_then(|key| match required {
            Some(required) if key.role < required => Err(AuthError::Forbidden(
                ForbiddenReason::InsufficientRole { required, actual: key.role },
            )),
            _ => Ok(key),
        });

        match result {
            Ok(key) => Ok(Principal::Key(key)),
            Err(err) => {
                let key_id = presented.and_then(parse_token).map_or("-", |(id, _)| id);
                let reason = match &err {
                    AuthError::Unauthenticated => "missing",
                    AuthError::Forbidden(reason) => reason.as_str(),
                };
                tracing::warn!(target: "audit", client = %client, key_id, reason, "Authentication failed");
                metrics::record_gate_rejection("auth", reason);
                Err(err)
            }
        }
    }

    /// Resolve a presented key without a role requirement and without
    /// auditing misses. Used by routes where a key is optional.
    pub fn identify(&self, presented: Option<&str>) -> Option<ApiKey> {
        self.verify(presented).ok()
    }

    fn verify(&self, presented: Option<&str>) -> Result<ApiKey, AuthError> {
        let token = match presented.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::Unauthenticated),
        };

        let presented_hash = hash_token(token);

        let Some((id, _)) = parse_token(token) else {
            let _ = constant_time_eq(&presented_hash, DUMMY_HASH);
            return Err(AuthError::Forbidden(ForbiddenReason::Malformed));
        };

        let stored = self.store.get(id);
        let expected = stored.as_ref().map_or(DUMMY_HASH, |k| k.secret_hash.as_str());
        let matches = constant_time_eq(&presented_hash, expected);

        match stored {
            None => Err(AuthError::Forbidden(ForbiddenReason::UnknownKey)),
            Some(_) if !matches => Err(AuthError::Forbidden(ForbiddenReason::BadSecret)),
            Some(key) if key.revoked => Err(AuthError::Forbidden(ForbiddenReason::Revoked)),
            Some(key) => Ok(key),
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
