//! Domain error codes and the per-request first-writer-wins error cell.
//!
//! The engine distinguishes two kinds of failure:
//! - Domain errors the caller should see, reported as an [`ErrorCode`] carried in
//!   an [`ErrorInfo`] through the request context (§7/§4.12 of the design doc).
//! - Programmer errors / invariant violations, which use `anyhow::Error` and are
//!   expected to propagate out of the core rather than be interpreted by a caller
//!   (e.g. looking up an unbound variable in the variable table).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Canonical error codes a request can surface to its caller.
///
/// One variant per named exception in the design doc's error handling section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("sql_execution_exception")]
    SqlExecutionException,
    #[error("inactive_transaction_exception")]
    InactiveTransactionException,
    #[error("target_not_found_exception")]
    TargetNotFoundException,
    #[error("target_already_exists_exception")]
    TargetAlreadyExistsException,
    #[error("unique_constraint_violation_exception")]
    UniqueConstraintViolationException,
    #[error("not_null_constraint_violation_exception")]
    NotNullConstraintViolationException,
    #[error("data_corruption_exception")]
    DataCorruptionException,
    #[error("sql_limit_reached_exception")]
    SqlLimitReachedException,
    #[error("request_canceled")]
    RequestCanceled,
    #[error("cc_exception")]
    CcException,
    #[error("cc_occ_exception")]
    CcOccException,
    #[error("cc_ltx_exception")]
    CcLtxException,
    #[error("cc_rtx_exception")]
    CcRtxException,
    #[error("conflict_on_write_preserve_exception")]
    ConflictOnWritePreserveException,
    #[error("write_without_preserve_exception")]
    WriteWithoutPreserveException,
    #[error("read_on_restricted_area_exception")]
    ReadOnRestrictedAreaException,
    #[error("compile_exception")]
    CompileException,
    #[error("value_evaluation_exception")]
    ValueEvaluationException,
    #[error("unsupported_runtime_feature_exception")]
    UnsupportedRuntimeFeatureException,
    #[error("permission_error")]
    PermissionError,
    #[error("internal_error")]
    InternalError,
}

impl ErrorCode {
    /// Broad category this code belongs to, matching §7's grouping.
    pub fn category(&self) -> ErrorCategory {
        use ErrorCategory::*;
        use ErrorCode::*;
        match self {
            TargetNotFoundException | TargetAlreadyExistsException => Structural,
            ValueEvaluationException | DataCorruptionException => Execution,
            InactiveTransactionException
            | CcException
            | CcOccException
            | CcLtxException
            | CcRtxException
            | ConflictOnWritePreserveException
            | WriteWithoutPreserveException
            | ReadOnRestrictedAreaException => Transactional,
            SqlLimitReachedException => Resource,
            InternalError | UnsupportedRuntimeFeatureException | CompileException
            | SqlExecutionException | UniqueConstraintViolationException
            | NotNullConstraintViolationException => System,
            PermissionError => Authorization,
            RequestCanceled => UserCancel,
        }
    }
}

/// Broad error category, used by diagnostics/metrics to bucket failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Structural,
    Execution,
    Transactional,
    Resource,
    System,
    Authorization,
    UserCancel,
}

/// A single reported error: a code, a human-readable message, and optional
/// supplemental diagnostic text (plan/transaction detail).
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub supplemental: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            supplemental: None,
        }
    }

    pub fn with_supplemental(mut self, text: impl Into<String>) -> Self {
        self.supplemental = Some(text.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(s) = &self.supplemental {
            write!(f, " ({s})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorInfo {}

/// First-writer-wins cell for a request's error info.
///
/// The first call to [`Self::set`] wins and is visible via [`Self::get`]; every
/// later call is appended to an internal diagnostic log instead of overwriting the
/// surfaced error, per §9's "mutable error-info singleton-per-request" note.
#[derive(Debug, Default)]
pub struct ErrorCell {
    claimed: AtomicBool,
    info: Mutex<Option<ErrorInfo>>,
    diagnostic_log: Mutex<Vec<ErrorInfo>>,
}

impl ErrorCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to set the surfaced error. Returns `true` if this call won the race
    /// (i.e. this is now the error the caller will observe).
    pub fn set(&self, info: ErrorInfo) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.info.lock().unwrap() = Some(info);
            true
        } else {
            self.diagnostic_log.lock().unwrap().push(info);
            false
        }
    }

    /// Returns `true` once any error has been set.
    pub fn is_set(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Returns the surfaced (first) error, if any.
    pub fn get(&self) -> Option<ErrorInfo> {
        self.info.lock().unwrap().clone()
    }

    /// Errors that lost the race, kept only for diagnostics.
    pub fn diagnostic_log(&self) -> Vec<ErrorInfo> {
        self.diagnostic_log.lock().unwrap().clone()
    }
}
