//! Error types for calassoc-engine

use calassoc_common::{Descriptor, ObservationId};
use thiserror::Error;

/// Typed evaluation failure
///
/// The only error rule evaluation surfaces. Its display text is what the
/// worker records in `refresh_queue.last_error`.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A rule named a descriptor its module never surfaced
    #[error("unknown descriptor '{descriptor}' in {module} rules")]
    UnknownDescriptor {
        descriptor: Descriptor,
        module: &'static str,
    },

    /// Reference lacks the `ut_datetime` a temporal rule needs
    #[error("observation {observation} has no ut_datetime")]
    MissingTemporal { observation: ObservationId },

    /// Applicability produced a category the module has no rule for
    #[error("{module} rules declare no lookup for category '{category}'")]
    UnsupportedCategory {
        category: String,
        module: &'static str,
    },

    /// Metadata store or cache I/O
    #[error("store error: {0}")]
    Store(#[from] calassoc_common::Error),
}

impl From<sqlx::Error> for EvalError {
    fn from(err: sqlx::Error) -> Self {
        EvalError::Store(calassoc_common::Error::Database(err))
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
