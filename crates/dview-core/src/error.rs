use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindError>;

/// Contract violations reported at the public call that detected them.
///
/// Soft inconsistencies (unknown events, empty lookups) are never errors;
/// they are silent no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("undefined model {path}")]
    UndefinedModel { path: String },

    #[error("property path {path} does not resolve to a model")]
    NotAModel { path: String },

    #[error("property path {path} is not a list")]
    NotAList { path: String },

    #[error("wrapper is not attached to a view")]
    Detached,

    #[error("number of wrapper sources ({sources}) and targets ({targets}) should be equal")]
    SeedMismatch { sources: usize, targets: usize },

    #[error("empty event spec")]
    EmptyEventSpec,
}

impl BindError {
    #[must_use]
    pub fn undefined(path: impl ToString) -> Self {
        Self::UndefinedModel {
            path: path.to_string(),
        }
    }

    #[must_use]
    pub fn not_a_model(path: impl ToString) -> Self {
        Self::NotAModel {
            path: path.to_string(),
        }
    }
}
