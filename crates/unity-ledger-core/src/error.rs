// Error taxonomy for the ledger engine.
//
// Three layers, outermost first:
// - `ApiError`: HTTP status + code + message, what the HTTP surface returns.
// - `ErrorCode`: the stable machine-readable code vocabulary.
// - `LedgerError`: the internal error enum every engine operation returns.
//
// Deterministic ledger errors (InvalidAmount, InsufficientBalance,
// InvalidRecipient) are never retried. Contention is retried internally
// before surfacing. DuplicateEvent is not a failure at all — idempotent
// paths swallow it and report success.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable error codes exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidAmount,
    InsufficientBalance,
    InvalidRecipient,
    Contention,
    PlanNotFound,
    ProviderUnavailable,
    DuplicateEvent,
    AccountNotFound,
    SessionNotFound,
    MalformedPayload,
    Unauthorized,
    InternalServerError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidAmount => "Amount must be a positive number of tokens",
            Self::InsufficientBalance => "Insufficient UNITY balance",
            Self::InvalidRecipient => "Invalid transfer recipient",
            Self::Contention => "The account is busy, please retry",
            Self::PlanNotFound => "Subscription plan not found",
            Self::ProviderUnavailable => "Payment provider unavailable, please retry",
            Self::DuplicateEvent => "Event already processed",
            Self::AccountNotFound => "Account not found",
            Self::SessionNotFound => "Payment session not found",
            Self::MalformedPayload => "Could not parse request body",
            Self::Unauthorized => "Authentication required",
            Self::InternalServerError => "Internal server error",
        };
        write!(f, "{msg}")
    }
}

/// HTTP status codes used by the API error system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    PaymentRequired = 402,
    NotFound = 404,
    Conflict = 409,
    UnprocessableEntity = 422,
    ServiceUnavailable = 503,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn status_code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code())
    }
}

/// API error — an HTTP status, a stable code, and a human-readable message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status} {code:?}: {message}")]
pub struct ApiError {
    pub status: HttpStatus,
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: HttpStatus, code: ErrorCode) -> Self {
        Self {
            message: code.to_string(),
            status,
            code,
        }
    }

    pub fn with_message(status: HttpStatus, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: ErrorCode) -> Self {
        Self::new(HttpStatus::BadRequest, code)
    }

    pub fn not_found(code: ErrorCode) -> Self {
        Self::new(HttpStatus::NotFound, code)
    }

    pub fn internal() -> Self {
        Self::new(HttpStatus::InternalServerError, ErrorCode::InternalServerError)
    }

    /// Build a JSON body for the error response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code,
            "message": self.message,
        })
    }
}

/// Internal error type returned by every ledger operation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be positive")]
    InvalidAmount,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("optimistic write retries exhausted")]
    Contention,

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl LedgerError {
    /// The stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidAmount => ErrorCode::InvalidAmount,
            Self::InsufficientBalance => ErrorCode::InsufficientBalance,
            Self::InvalidRecipient(_) => ErrorCode::InvalidRecipient,
            Self::Contention => ErrorCode::Contention,
            Self::PlanNotFound(_) => ErrorCode::PlanNotFound,
            Self::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            Self::Duplicate(_) => ErrorCode::DuplicateEvent,
            Self::NotFound("payment_session") => ErrorCode::SessionNotFound,
            Self::NotFound(_) => ErrorCode::AccountNotFound,
            _ => ErrorCode::InternalServerError,
        }
    }

    /// Map to the HTTP-facing error representation.
    pub fn to_api_error(&self) -> ApiError {
        let status = match self {
            Self::InvalidAmount | Self::InvalidRecipient(_) => HttpStatus::BadRequest,
            Self::InsufficientBalance => HttpStatus::PaymentRequired,
            Self::PlanNotFound(_) | Self::NotFound(_) => HttpStatus::NotFound,
            Self::Contention => HttpStatus::Conflict,
            Self::ProviderUnavailable(_) => HttpStatus::ServiceUnavailable,
            Self::Duplicate(_) => HttpStatus::Conflict,
            _ => HttpStatus::InternalServerError,
        };
        ApiError::with_message(status, self.code(), self.to_string())
    }

    /// True for errors the caller may safely retry (no balance side effects).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention | Self::ProviderUnavailable(_))
    }
}

/// Unified result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
