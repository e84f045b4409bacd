#![forbid(unsafe_code)]

use dataroom_contracts::ContractViolation;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
    #[error("storage failure while {context}: {message}")]
    Backend {
        context: &'static str,
        message: String,
    },
}

/// Caller-facing classification. Only `Storage` is a server-side fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    Validation,
    Storage,
}

impl StorageError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn backend(context: &'static str, message: impl Into<String>) -> Self {
        StorageError::Backend {
            context,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::NotFound { .. } => StorageErrorKind::NotFound,
            StorageError::ContractViolation(_) => StorageErrorKind::Validation,
            StorageError::DuplicateKey { .. } | StorageError::Backend { .. } => {
                StorageErrorKind::Storage
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == StorageErrorKind::NotFound
    }
}
