//! Error types seen at the worker boundary.

use std::fmt;
use std::ops::ControlFlow;

use thiserror::Error;
use uuid::Uuid;

/// Failure of a [`DataStore`](crate::store::DataStore) operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Retrying later may succeed (connection loss, pool exhaustion,
    /// serialization failure, deadlock).
    #[error("transient store error: {0:#}")]
    Transient(anyhow::Error),

    /// Retrying will not help (constraint violation, bad data, decode error).
    #[error("store error: {0:#}")]
    Permanent(anyhow::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
}

impl StoreError {
    /// Sort an error from the query layer into transient or permanent by
    /// looking for a `sqlx::Error` in its chain. Errors with no database
    /// cause are permanent.
    pub fn classify(err: anyhow::Error) -> Self {
        let transient = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
            .is_some_and(is_transient_sqlx_error);
        if transient {
            Self::Transient(err)
        } else {
            Self::Permanent(err)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::classify(err)
    }
}

fn is_transient_sqlx_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().is_some_and(|code| {
            // 08 connection exception, 40 transaction rollback (serialization
            // failure, deadlock), 53 insufficient resources, 57 operator
            // intervention.
            ["08", "40", "53", "57"]
                .iter()
                .any(|class| code.starts_with(class))
        }),
        sqlx::Error::RowNotFound
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::Encode(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Migrate(_) => false,
        _ => true,
    }
}

/// Failure to hand a message to the broker.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to deliver message to {topic}: {cause:#}")]
    Delivery { topic: String, cause: anyhow::Error },
}

/// A recipe whose step graph cannot be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRecipe {
    #[error("recipe {recipe_id} has a cycle through steps {}", join_ids(.step_ids))]
    Cycle { recipe_id: Uuid, step_ids: Vec<Uuid> },

    #[error(
        "step {step_id} of recipe {recipe_id} consumes product {product_id}, which no step of the recipe makes"
    )]
    DanglingProductReference {
        recipe_id: Uuid,
        step_id: Uuid,
        product_id: Uuid,
    },

    #[error("step {step_id} of recipe {recipe_id} consumes its own product")]
    SelfReference { recipe_id: Uuid, step_id: Uuid },

    #[error("prep task {prep_task_id} of recipe {recipe_id} refers to unknown step {step_id}")]
    UnknownPrepTaskStep {
        recipe_id: Uuid,
        prep_task_id: Uuid,
        step_id: Uuid,
    },
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error returned from a worker sweep.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    InvalidRecipe(#[from] InvalidRecipe),

    #[error(transparent)]
    Multiple(#[from] MultiError),
}

impl WorkerError {
    /// True if this error, or any error it aggregates, is a transient store
    /// error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::Multiple(errors) => errors.iter().any(Self::is_transient),
            Self::Publish(_) | Self::InvalidRecipe(_) => false,
        }
    }
}

/// Per-item failures gathered during one sweep.
///
/// Nested `MultiError`s are flattened on [`push`](Self::push).
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<WorkerError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Returns [`ControlFlow::Break`] when the failure is
    /// transient and the sweep should stop.
    pub fn push(&mut self, err: impl Into<WorkerError>) -> ControlFlow<()> {
        let err = err.into();
        let transient = err.is_transient();
        match err {
            WorkerError::Multiple(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
        if transient {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkerError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing failed; a single failure is returned as itself.
    pub fn into_result(mut self) -> Result<(), WorkerError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(WorkerError::Multiple(self)),
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 { "error" } else { "errors" };
        write!(f, "{} {noun} occurred:", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl<'a> IntoIterator for &'a MultiError {
    type Item = &'a WorkerError;
    type IntoIter = std::slice::Iter<'a, WorkerError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
