use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invoice {id} not found")]
    NotFound { id: Uuid },

    #[error("client {client_id} does not exist in this tenant")]
    UnknownClient { client_id: Uuid },

    #[error("invoice {id} is already paid")]
    AlreadyPaid { id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),
}
