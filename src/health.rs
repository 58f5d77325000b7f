//! Provider health tracking and the error taxonomy.
//!
//! Adapters surface provider failures as error strings carrying the HTTP
//! status and response body. This module classifies those strings against
//! closed, versioned vocabularies and applies the resulting policy to the
//! provider's status row. The vocabularies live here and nowhere else.

use chrono::{Duration, Utc};

use crate::{error::AppError, registry::Registry};

/// Failure classes recognized by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The provider is out of credits or quota.
    Quota,
    /// A temporary provider-side or network condition.
    Transient,
    /// Authentication or authorization failure (401/403).
    Auth,
    /// The request itself is malformed (400).
    BadRequest,
    /// Anything else.
    Other,
}

/// What the router should do after a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Skip this provider and continue down the chain.
    NextProvider,
    /// Abort the chain; no other provider can satisfy a malformed request.
    AbortChain,
}

impl ErrorClass {
    /// Policy for this class.
    pub fn action(&self) -> FailureAction {
        match self {
            ErrorClass::BadRequest => FailureAction::AbortChain,
            _ => FailureAction::NextProvider,
        }
    }
}

/// Quota / out-of-credit signals. A match marks the provider exhausted.
const QUOTA_PATTERNS: &[&str] = &[
    "credit balance too low",
    "insufficient_quota",
    "insufficient quota",
    "quota exceeded",
    "billing hard limit",
    "exceeded your current quota",
    "out of credits",
    "subscription expired",
    "api key expired",
    "exceeded monthly limit",
    "payment required",
    "402",
];

/// Temporary conditions. A match increments the failure counter.
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "network error",
    "temporarily unavailable",
    "service overloaded",
    "overloaded_error",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "too many requests",
    "429",
    "500",
    "502",
    "503",
    "504",
];

/// Authentication failures, matched on the HTTP status substring.
const AUTH_PATTERNS: &[&str] = &["401", "403", "unauthorized", "forbidden"];

/// Malformed-request signal, matched on the HTTP status substring.
const BAD_REQUEST_PATTERNS: &[&str] = &["400", "invalid_request_error"];

/// Classifies an adapter error message into a failure class.
pub fn classify_error(error_msg: &str) -> ErrorClass {
    let error_lower = error_msg.to_lowercase();

    if QUOTA_PATTERNS.iter().any(|p| error_lower.contains(p)) {
        return ErrorClass::Quota;
    }

    // 400 must be probed before the transient 5xx numbers so that e.g.
    // "status 400" never reads as retryable, and after quota so that a 402
    // body mentioning billing stays a quota signal.
    if BAD_REQUEST_PATTERNS.iter().any(|p| error_lower.contains(p)) {
        return ErrorClass::BadRequest;
    }

    if AUTH_PATTERNS.iter().any(|p| error_lower.contains(p)) {
        return ErrorClass::Auth;
    }

    if TRANSIENT_PATTERNS.iter().any(|p| error_lower.contains(p)) {
        return ErrorClass::Transient;
    }

    ErrorClass::Other
}

/// Applies classified failures and successes to provider status rows.
#[derive(Clone, Debug)]
pub struct HealthTracker {
    registry: Registry,
    quota_cooldown_minutes: i64,
}

impl HealthTracker {
    /// Creates a tracker writing through the given registry.
    pub fn new(registry: Registry, quota_cooldown_minutes: i64) -> Self {
        Self {
            registry,
            quota_cooldown_minutes,
        }
    }

    /// Records a successful call: failures reset, exhaustion cleared.
    pub async fn record_success(&self, provider_id: &str) -> Result<(), AppError> {
        self.registry.mark_provider_healthy(provider_id).await
    }

    /// Records a failed call. Returns the class so the router can decide
    /// whether to continue down the chain.
    pub async fn record_failure(
        &self,
        provider_id: &str,
        error_message: &str,
    ) -> Result<ErrorClass, AppError> {
        let class = classify_error(error_message);

        match class {
            ErrorClass::Quota => {
                let until = Utc::now() + Duration::minutes(self.quota_cooldown_minutes);
                self.registry
                    .mark_provider_exhausted(provider_id, until)
                    .await?;
            }
            ErrorClass::BadRequest => {
                // The request is at fault, not the provider; its counters
                // are left untouched.
            }
            ErrorClass::Transient | ErrorClass::Auth | ErrorClass::Other => {
                self.registry.increment_provider_failures(provider_id).await?;
            }
        }

        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_signals_classify_as_quota() {
        assert_eq!(
            classify_error("Your credit balance too low to complete this request"),
            ErrorClass::Quota
        );
        assert_eq!(
            classify_error("status 429: You exceeded your current quota"),
            ErrorClass::Quota
        );
        assert_eq!(classify_error("insufficient_quota"), ErrorClass::Quota);
        assert_eq!(
            classify_error("Billing hard limit has been reached"),
            ErrorClass::Quota
        );
        assert_eq!(classify_error("API key expired"), ErrorClass::Quota);
    }

    #[test]
    fn transient_signals_classify_as_transient() {
        assert_eq!(classify_error("request timeout"), ErrorClass::Transient);
        assert_eq!(
            classify_error("Connection reset by peer"),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error("status 503: Service Unavailable"),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error("status 502: Bad Gateway"),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error("status 429: Too Many Requests"),
            ErrorClass::Transient
        );
    }

    #[test]
    fn auth_status_classifies_as_auth() {
        assert_eq!(classify_error("status 401: invalid key"), ErrorClass::Auth);
        assert_eq!(classify_error("status 403: Forbidden"), ErrorClass::Auth);
    }

    #[test]
    fn bad_request_classifies_before_transient() {
        assert_eq!(
            classify_error("status 400: missing field `prompt`"),
            ErrorClass::BadRequest
        );
    }

    #[test]
    fn quota_wins_over_status_code() {
        // A 429 whose body names quota is exhaustion, not backoff.
        assert_eq!(
            classify_error("status 429: you exceeded your current quota, check billing"),
            ErrorClass::Quota
        );
    }

    #[test]
    fn unknown_errors_classify_as_other() {
        assert_eq!(classify_error("mysterious failure"), ErrorClass::Other);
    }

    #[test]
    fn only_bad_request_aborts_the_chain() {
        assert_eq!(ErrorClass::BadRequest.action(), FailureAction::AbortChain);
        for class in [
            ErrorClass::Quota,
            ErrorClass::Transient,
            ErrorClass::Auth,
            ErrorClass::Other,
        ] {
            assert_eq!(class.action(), FailureAction::NextProvider);
        }
    }
}
