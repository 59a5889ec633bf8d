//! Domain error taxonomy and the error → code table.
//!
//! # Responsibilities
//! - Define the closed set of domain errors handlers may report
//! - Map each error to a stable 6-digit response code
//! - Derive the HTTP status from the first three digits of a code
//!
//! # Design Decisions
//! - Codes are never renumbered; clients match on them
//! - Unknown errors map to the generic internal code, never a panic
//! - Malformed codes are caught by `validate_code_table` at startup

use axum::http::StatusCode;
use std::error::Error as StdError;
use thiserror::Error;

/// A stable, machine-readable response code.
///
/// The first three characters are the HTTP status the code is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(&'static str);

/// Returned when a code cannot yield an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed response code {code:?}: {reason}")]
pub struct MalformedCode {
    pub code: String,
    pub reason: &'static str,
}

impl ResponseCode {
    pub const GENERIC_SUCCESS: Self = Self("200000");
    pub const BAD_REQUEST: Self = Self("400000");
    pub const ALREADY_REGISTERED: Self = Self("400001");
    pub const TRANSACTION_ALREADY_DONE: Self = Self("400003");
    pub const UNAUTHORIZED: Self = Self("401000");
    pub const REQUIRED_TOKEN: Self = Self("401000");
    pub const FORBIDDEN: Self = Self("403000");
    pub const NOT_FOUND: Self = Self("404000");
    pub const NO_LINKER_EXISTS: Self = Self("411553");
    pub const PRECONDITION_FAILED: Self = Self("412000");
    pub const PRECONDITION_FAILED_TEST: Self = Self("412000");
    pub const INTERNAL_ERROR: Self = Self("500000");
    pub const TIMEOUT: Self = Self("504000");

    /// Every code the table can produce, used for startup validation.
    pub const ALL: &'static [ResponseCode] = &[
        Self::GENERIC_SUCCESS,
        Self::BAD_REQUEST,
        Self::ALREADY_REGISTERED,
        Self::TRANSACTION_ALREADY_DONE,
        Self::UNAUTHORIZED,
        Self::REQUIRED_TOKEN,
        Self::FORBIDDEN,
        Self::NOT_FOUND,
        Self::NO_LINKER_EXISTS,
        Self::PRECONDITION_FAILED,
        Self::PRECONDITION_FAILED_TEST,
        Self::INTERNAL_ERROR,
        Self::TIMEOUT,
    ];

    /// Wrap a raw code. Use `http_status` to check it before serving.
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Derive the HTTP status from the first three characters.
    pub fn http_status(&self) -> Result<StatusCode, MalformedCode> {
        let malformed = |reason| MalformedCode {
            code: self.0.to_string(),
            reason,
        };

        let prefix = self.0.get(..3).ok_or_else(|| malformed("shorter than 3 characters"))?;
        let status: u16 = prefix
            .parse()
            .map_err(|_| malformed("status prefix is not numeric"))?;
        StatusCode::from_u16(status).map_err(|_| malformed("status prefix is not a valid HTTP status"))
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Check every code in the table. Run once at startup; any failure is fatal.
pub fn validate_code_table() -> Result<(), MalformedCode> {
    for code in ResponseCode::ALL {
        code.http_status()?;
    }
    Ok(())
}

/// The closed set of domain errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DomainError {
    #[error("Bad request")]
    BadRequest,
    #[error("Forbidden resource")]
    ForbiddenResource,
    #[error("Terms and conditions not accepted")]
    TermsNotAccepted,
    #[error("Not Found")]
    NotFound,
    #[error("Precondition failed")]
    PreconditionFailed,
    #[error("Internal server error")]
    InternalServerError,
    #[error("Timeout error")]
    Timeout,
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("No Linker exist")]
    NoLinkerExists,
    #[error("No Valid User Found")]
    NoValidUserFound,
    #[error("Transaction Already Done")]
    TransactionAlreadyDone,
    #[error("Excess Refund Amount")]
    ExcessRefundAmount,
    #[error("Refund already done")]
    RefundAlreadyDone,
    #[error("Invalid Transaction Id")]
    InvalidTransactionId,
    #[error("Duplicate Request")]
    DuplicateRequest,
    #[error("Signature MisMatch")]
    SignatureMismatch,
    #[error("Refund not allowed against Txn with Non-Payment type")]
    RefundAgainstInvalidTransactionType,
    #[error("Saldo Redund Already processed")]
    SaldoRefundAlreadyProcessed,
    #[error("No Unsettled Bill Found")]
    NoUnsettledBillFound,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("Precondition failed test")]
    PreconditionFailedTest,
    #[error("Tokopedia email id can not be used")]
    ReservedEmailDomain,
    #[error("No Bill found")]
    NoBillFound,
    #[error("Last date to pay bill is over, pay your bill in next billing cycle.")]
    BillDueDatePassed,
    #[error("OVO wallet not found")]
    WalletNotFound,
    #[error("Invalid auth token")]
    InvalidToken,
    #[error("Auth token is required")]
    RequiredToken,
    #[error("No Authorization Found")]
    Unauthorized,
}

impl DomainError {
    /// Every variant, in declaration order.
    pub const ALL: &'static [DomainError] = &[
        Self::BadRequest,
        Self::ForbiddenResource,
        Self::TermsNotAccepted,
        Self::NotFound,
        Self::PreconditionFailed,
        Self::InternalServerError,
        Self::Timeout,
        Self::AlreadyRegistered,
        Self::NoLinkerExists,
        Self::NoValidUserFound,
        Self::TransactionAlreadyDone,
        Self::ExcessRefundAmount,
        Self::RefundAlreadyDone,
        Self::InvalidTransactionId,
        Self::DuplicateRequest,
        Self::SignatureMismatch,
        Self::RefundAgainstInvalidTransactionType,
        Self::SaldoRefundAlreadyProcessed,
        Self::NoUnsettledBillFound,
        Self::InvalidOtp,
        Self::PreconditionFailedTest,
        Self::ReservedEmailDomain,
        Self::NoBillFound,
        Self::BillDueDatePassed,
        Self::WalletNotFound,
        Self::InvalidToken,
        Self::RequiredToken,
        Self::Unauthorized,
    ];

    /// The table entry for this error.
    pub fn code(&self) -> ResponseCode {
        match self {
            Self::BadRequest
            | Self::NoValidUserFound
            | Self::InvalidOtp
            | Self::TermsNotAccepted
            | Self::ReservedEmailDomain
            | Self::WalletNotFound => ResponseCode::BAD_REQUEST,
            Self::ForbiddenResource | Self::InvalidToken => ResponseCode::FORBIDDEN,
            Self::NotFound => ResponseCode::NOT_FOUND,
            Self::PreconditionFailed | Self::BillDueDatePassed | Self::NoBillFound => {
                ResponseCode::PRECONDITION_FAILED
            }
            Self::PreconditionFailedTest => ResponseCode::PRECONDITION_FAILED_TEST,
            Self::Timeout => ResponseCode::TIMEOUT,
            Self::AlreadyRegistered | Self::DuplicateRequest => ResponseCode::ALREADY_REGISTERED,
            Self::NoLinkerExists => ResponseCode::NO_LINKER_EXISTS,
            Self::TransactionAlreadyDone => ResponseCode::TRANSACTION_ALREADY_DONE,
            Self::RequiredToken => ResponseCode::REQUIRED_TOKEN,
            Self::Unauthorized => ResponseCode::UNAUTHORIZED,
            // Declared but never given a dedicated code.
            Self::InternalServerError
            | Self::ExcessRefundAmount
            | Self::RefundAlreadyDone
            | Self::InvalidTransactionId
            | Self::SignatureMismatch
            | Self::RefundAgainstInvalidTransactionType
            | Self::SaldoRefundAlreadyProcessed
            | Self::NoUnsettledBillFound => ResponseCode::INTERNAL_ERROR,
        }
    }
}

/// An error annotated with context, optionally tagged with the domain error
/// it represents.
///
/// Code lookup uses the tagged kind, so handlers can wrap a domain error with
/// call-site detail without changing what the client receives.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ErrorChain {
    message: String,
    kind: Option<DomainError>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ErrorChain {
    /// Tag `kind` with a context message.
    pub fn new(kind: DomainError, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
            source: None,
        }
    }

    /// Wrap an arbitrary error. Lookup falls back to its source if that is a
    /// domain error.
    pub fn wrap<E>(source: E, message: impl Into<String>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            kind: None,
            source: Some(Box::new(source)),
        }
    }

    /// Wrap with a flag, rendering `"[FLAG] a | b: <kind>"`.
    ///
    /// A missing kind is reported as a developer mistake rather than silently
    /// succeeding.
    pub fn wrap_with_flag(kind: Option<DomainError>, flag: &str, parts: &[&str]) -> Self {
        let flag = flag.trim();
        let mut message = if flag.is_empty() {
            String::new()
        } else {
            format!("[{}] ", flag.to_uppercase())
        };
        message.push_str(&parts.join(" | "));

        match kind {
            Some(kind) => Self {
                message: format!("{message}: {kind}"),
                kind: Some(kind),
                source: None,
            },
            None => Self {
                message: format!("{message}: [FOR DEVELOPER] forget to set error in {flag}"),
                kind: None,
                source: None,
            },
        }
    }

    pub fn kind(&self) -> Option<DomainError> {
        self.kind
    }
}

/// Resolve the domain error an arbitrary error stands for, unwrapping one
/// level of chaining.
pub fn domain_kind(err: &(dyn StdError + 'static)) -> Option<DomainError> {
    if let Some(domain) = err.downcast_ref::<DomainError>() {
        return Some(*domain);
    }
    if let Some(chain) = err.downcast_ref::<ErrorChain>() {
        if let Some(kind) = chain.kind() {
            return Some(kind);
        }
    }
    err.source()
        .and_then(|source| source.downcast_ref::<DomainError>())
        .copied()
}

/// Look up the response code for an optional error.
///
/// `None` is success; errors outside the table are internal errors.
pub fn code_for(err: Option<&(dyn StdError + 'static)>) -> ResponseCode {
    match err {
        None => ResponseCode::GENERIC_SUCCESS,
        Some(err) => domain_kind(err)
            .map(|kind| kind.code())
            .unwrap_or(ResponseCode::INTERNAL_ERROR),
    }
}
