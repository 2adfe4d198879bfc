use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} not found")]
    NotFound(String),

    /// Operation not legal from the job's current state (e.g. retrying a
    /// job that is not failed).
    #[error("job {id} is {state}, expected {expected}")]
    WrongState {
        id: String,
        state: &'static str,
        expected: &'static str,
    },

    #[error("queue backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl From<QueueError> for gridkit_common::Error {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(id) => {
                gridkit_common::Error::not_found(format!("job {id} not found"))
            },
            wrong @ QueueError::WrongState { .. } => {
                gridkit_common::Error::conflict(wrong.to_string())
            },
            other => gridkit_common::Error::internal("queue failure", other),
        }
    }
}
