// src/errors.rs
//
// Error taxonomy shared by the encoding engine and the dispatcher.

use ethers::types::{Address, U256};
use thiserror::Error;

use crate::chain::LedgerError;
use crate::registry::RegistryError;

/// Errors raised while validating or serializing a solution, and while
/// unpacking a program on the dispatcher side (wire-format errors).
///
/// All of these are detected before anything executes and are not retryable
/// without changing the input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    #[error("solution has no swaps")]
    EmptySolution,
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },
    #[error("solution is not decomposable into a supported strategy: {reason}")]
    Undecomposable { reason: String },
    #[error("cyclic flag is {declared} but input/output tokens say {actual}")]
    CyclicFlagMismatch { declared: bool, actual: bool },
    #[error("incompatible flags: {0}")]
    IncompatibleFlags(String),
    #[error("no swap encoder registered for venue '{0}'")]
    UnknownVenue(String),
    #[error("invalid split for token {token:?}: {reason}")]
    InvalidSplit { token: Address, reason: String },
    #[error("element of {len} bytes exceeds the {max} byte length prefix limit")]
    ElementTooLarge { len: usize, max: usize },
    #[error("{0} distinct tokens exceed the 255 slot limit")]
    TooManyTokens(usize),
    #[error("length mismatch in {context}: declared {declared} bytes, found {actual}")]
    LengthMismatch {
        context: &'static str,
        declared: usize,
        actual: usize,
    },
    #[error("invalid {field} tag {value:#04x}")]
    InvalidTag { field: &'static str, value: u8 },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EncodingError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EncodingError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn undecomposable(reason: impl Into<String>) -> Self {
        EncodingError::Undecomposable {
            reason: reason.into(),
        }
    }
}

/// Failure reported by a venue executor. Propagated by the dispatcher
/// unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    #[error("{venue}: malformed params: {reason}")]
    MalformedParams { venue: &'static str, reason: String },
    #[error("{venue}: no quote for {token_in:?} -> {token_out:?}")]
    NoLiquidity {
        venue: &'static str,
        token_in: Address,
        token_out: Address,
    },
    #[error("{venue}: {reason}")]
    Failed { venue: &'static str, reason: String },
}

/// Errors that abort a dispatcher run. Every one of them rolls the ledger back
/// to the state it had before the run started.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    // Wire format
    #[error("malformed program: {0}")]
    Malformed(#[from] EncodingError),
    #[error("invalid run input: {0}")]
    InvalidRun(String),

    // Authorization
    #[error("delegated pull of {token:?} from {owner:?} not authorized: required {required}, available {available}")]
    InsufficientAuthorization {
        token: Address,
        owner: Address,
        required: U256,
        available: U256,
    },

    // Registry
    #[error(transparent)]
    Registry(#[from] RegistryError),

    // Accounting
    #[error("negative slippage: realized {realized}, minimum {minimum}")]
    NegativeSlippage { realized: U256, minimum: U256 },
    #[error("input consumed {consumed}, expected {expected}")]
    AmountConsumedMismatch { consumed: U256, expected: U256 },
    #[error("residual balance of {token:?} left in the dispatcher: {amount}")]
    ResidualBalance { token: Address, amount: U256 },
    #[error("executors reported {reported} of output but {realized} was realized")]
    OutputMismatch { reported: U256, realized: U256 },
    #[error("entry funds missing: holding {available}, required {required}")]
    InsufficientEntryFunds { available: U256, required: U256 },
    #[error("hop {hop} would swap a zero amount")]
    ZeroAmountHop { hop: usize },
    #[error("callback received outside of an active callback window")]
    UnsolicitedCallback,
    #[error("callback from {got:?}, expected executor {expected:?}")]
    UnexpectedCallback { expected: Address, got: Address },
    #[error("callback selector {got:02x?} does not match expected {expected:02x?}")]
    CallbackSelectorMismatch { expected: [u8; 4], got: [u8; 4] },
    #[error("callback requested {requested}, hop allows {limit}")]
    CallbackOverdraw { requested: U256, limit: U256 },
    #[error("hop {hop} returned without settling its callback")]
    CallbackNotSettled { hop: usize },

    // Concurrency
    #[error("a run is already in flight")]
    RunInFlight,

    // Venue
    #[error(transparent)]
    Venue(#[from] VenueError),

    // Token ledger
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl DispatchError {
    /// Authorization failures are the only category the caller can fix by
    /// re-authorizing and resubmitting the same program.
    pub fn is_retryable_after_reauthorization(&self) -> bool {
        matches!(self, DispatchError::InsufficientAuthorization { .. })
    }

    /// Stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Malformed(_) | DispatchError::InvalidRun(_) => "encoding",
            DispatchError::InsufficientAuthorization { .. } => "authorization",
            DispatchError::Registry(_) => "registry",
            DispatchError::RunInFlight => "reentrancy",
            DispatchError::Venue(_) => "venue",
            DispatchError::Ledger(_) => "ledger",
            _ => "accounting",
        }
    }
}
