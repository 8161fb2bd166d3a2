use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("client {id} not found")]
    NotFound { id: Uuid },

    #[error("a client with email '{email}' already exists")]
    DuplicateEmail { email: String },

    #[error("tenant '{tenant}' reached the limit of {limit} clients")]
    TenantFull { tenant: String, limit: usize },

    #[error("validation failed: {0}")]
    Validation(String),
}
