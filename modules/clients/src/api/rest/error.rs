use bizkit::Problem;

use crate::domain::error::DomainError;

/// Convert domain errors to HTTP Problem responses
pub fn domain_error_to_problem(err: DomainError) -> Problem {
    let detail = err.to_string();
    match err {
        DomainError::NotFound { .. } => Problem::new(404, "Client Not Found", detail),
        DomainError::DuplicateEmail { .. } => Problem::new(409, "Duplicate Email", detail),
        DomainError::TenantFull { .. } => Problem::new(409, "Client Limit Reached", detail),
        DomainError::Validation(_) => Problem::new(400, "Validation Error", detail),
    }
}

impl From<DomainError> for Problem {
    fn from(e: DomainError) -> Self {
        domain_error_to_problem(e)
    }
}
