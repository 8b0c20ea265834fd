//! Error types for the Keyward service layer.
//!
//! Every error maps to an [`ErrorKind`]. The kind and its
//! [`public_message`](KeywardError::public_message) are all that may cross the
//! trust boundary; the full error chain is for logs only.

use std::fmt;

use keyward_core::{CoreError, CredentialsRole, KeyUsage};
use keyward_perms::PermsError;
use keyward_store::StoreError;
use thiserror::Error;

/// Coarse classification of errors for the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Routine: the resource does not exist (or is no longer active).
    NotFound,
    /// A policy conflict, e.g. an active short code already exists.
    AlreadyExists,
    /// Envelope authentication failed: tampering or wrong master key.
    InvalidSecret,
    /// Authenticated, but not allowed.
    Unauthorized,
    /// Could not authenticate at all.
    Unauthenticated,
    InvalidInput,
    /// The process must not start (or keep serving) with this configuration.
    Configuration,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidSecret => "invalid_secret",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Internal => "internal",
        }
    }

    /// Message safe to show to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "resource not found",
            ErrorKind::AlreadyExists => "resource already exists",
            ErrorKind::InvalidSecret => "invalid secret",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Unauthenticated => "authentication failed",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Configuration => "service misconfigured",
            ErrorKind::Internal => "internal error",
        }
    }

    /// Whether this kind is part of normal operation and should not alert.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            ErrorKind::InvalidSecret | ErrorKind::Configuration | ErrorKind::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a privilege-tier change was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleUpdateError {
    #[error("user is not allowed to update its own role")]
    SelfUpdate,

    #[error("user is not allowed to upgrade users to a higher role than its own: {current} to {requested}")]
    UpgradeAboveOwnRole {
        current: CredentialsRole,
        requested: CredentialsRole,
    },

    #[error("user can only downgrade users from a lower role: {current} to {requested}")]
    DowngradeNotLower {
        current: CredentialsRole,
        requested: CredentialsRole,
    },
}

/// Errors that can occur in Keyward services.
#[derive(Debug, Error)]
pub enum KeywardError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("permission error: {0}")]
    Perms(#[from] PermsError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The presented short code does not match the active one.
    #[error("invalid short code")]
    InvalidShortCode,

    /// No usable key exists for a usage.
    #[error("no active key for usage {0}")]
    NoActiveKey(KeyUsage),

    #[error("role update refused: {0}")]
    RoleUpdate(#[from] RoleUpdateError),

    /// An error annotated with the operation that failed.
    #[error("{operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<KeywardError>,
    },
}

impl KeywardError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeywardError::Core(e) => core_kind(e),
            KeywardError::Store(e) => match e {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
                _ => ErrorKind::Internal,
            },
            KeywardError::Perms(e) if e.is_configuration() => ErrorKind::Configuration,
            KeywardError::Perms(e) if e.is_unauthenticated() => ErrorKind::Unauthenticated,
            KeywardError::Perms(_) => ErrorKind::Unauthorized,
            KeywardError::Config(_) => ErrorKind::Configuration,
            KeywardError::InvalidInput(_) => ErrorKind::InvalidInput,
            KeywardError::InvalidShortCode => ErrorKind::Unauthorized,
            KeywardError::NoActiveKey(_) => ErrorKind::NotFound,
            KeywardError::RoleUpdate(_) => ErrorKind::Unauthorized,
            KeywardError::Operation { source, .. } => source.kind(),
        }
    }

    /// Message safe to show to callers. Never includes storage or transport
    /// details.
    pub fn public_message(&self) -> &'static str {
        self.kind().public_message()
    }

    /// The innermost error, past any operation annotations.
    pub fn root(&self) -> &KeywardError {
        match self {
            KeywardError::Operation { source, .. } => source.root(),
            other => other,
        }
    }
}

fn core_kind(e: &CoreError) -> ErrorKind {
    if e.is_invalid_secret() {
        return ErrorKind::InvalidSecret;
    }
    match e {
        CoreError::MissingMasterKey(_) | CoreError::InvalidMasterKey(_) => {
            ErrorKind::Configuration
        }
        CoreError::UnknownVariant { .. } => ErrorKind::InvalidInput,
        _ => ErrorKind::Internal,
    }
}

/// Annotate errors with the operation that produced them.
pub trait OperationContext<T> {
    fn operation(self, operation: &'static str) -> Result<T>;
}

impl<T, E: Into<KeywardError>> OperationContext<T> for std::result::Result<T, E> {
    fn operation(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| KeywardError::Operation {
            operation,
            source: Box::new(e.into()),
        })
    }
}

/// Result type for Keyward operations.
pub type Result<T> = std::result::Result<T, KeywardError>;
