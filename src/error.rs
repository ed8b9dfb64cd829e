use thiserror::Error;

use crate::domain::TransitionError;
use crate::ports::{RateError, RepositoryError};
use crate::stellar::HorizonError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Horizon error: {0}")]
    Horizon(#[from] HorizonError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State machine error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("Integration fault: {0}")]
    IntegrationFault(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    /// Fatal errors end the worker that hit them. Everything else is logged
    /// and the offending item skipped.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Repository(RepositoryError::Database(_))
            | AppError::Horizon(_)
            | AppError::IntegrationFault(_)
            | AppError::Config(_)
            | AppError::Task(_) => true,
            AppError::Repository(RepositoryError::NotFound(_) | RepositoryError::Corrupt(_))
            | AppError::Validation(_)
            | AppError::Transition(_)
            | AppError::PriceUnavailable(_) => false,
        }
    }
}

impl From<RateError> for AppError {
    fn from(err: RateError) -> Self {
        match err {
            RateError::Unavailable(reason) => AppError::PriceUnavailable(reason),
            RateError::Fault(source) => AppError::IntegrationFault(source),
        }
    }
}
