use bizkit::Problem;

use crate::domain::error::DomainError;

pub fn domain_error_to_problem(err: DomainError) -> Problem {
    let detail = err.to_string();
    match err {
        DomainError::NotFound { .. } => Problem::new(404, "Invoice Not Found", detail),
        DomainError::UnknownClient { .. } => Problem::new(422, "Unknown Client", detail),
        DomainError::AlreadyPaid { .. } => Problem::new(409, "Already Paid", detail),
        DomainError::Validation(_) => Problem::new(400, "Validation Error", detail),
    }
}

impl From<DomainError> for Problem {
    fn from(e: DomainError) -> Self {
        domain_error_to_problem(e)
    }
}
