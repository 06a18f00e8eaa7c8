use open_meteo_client::FetchFailure;
use serde::Serialize;
use thiserror::Error;

/// Request failures that end without any weather or coordinates to show.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Location '{0}' not found")]
    LocationNotFound(String),

    #[error("Could not resolve location: {0}")]
    LocationUnresolved(FetchFailure),

    #[error("Simulation scenario '{0}' not found")]
    UnknownScenario(String),

    /// A refresh could not reach the provider.
    #[error("Weather service unavailable: {0}")]
    Upstream(FetchFailure),
}

/// Wire body for a [`ServiceError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error_type: String,
    pub message: String,
    pub retry_after: Option<u64>,
    pub location_found: bool,
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidLocation(_) => 400,
            ServiceError::UnknownScenario(_) => 404,
            ServiceError::LocationNotFound(_)
            | ServiceError::LocationUnresolved(_)
            | ServiceError::Upstream(_) => 503,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::InvalidLocation(_) => "invalid_location",
            ServiceError::LocationNotFound(_) => "location_not_found",
            ServiceError::LocationUnresolved(failure) | ServiceError::Upstream(failure) => {
                failure.kind()
            }
            ServiceError::UnknownScenario(_) => "unknown_scenario",
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ServiceError::LocationUnresolved(failure) | ServiceError::Upstream(failure) => {
                failure.retry_after_secs()
            }
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_type: self.error_type().to_string(),
            message: self.to_string(),
            retry_after: self.retry_after(),
            location_found: false,
        }
    }
}

impl From<common::Error> for ServiceError {
    fn from(err: common::Error) -> Self {
        match err {
            common::Error::InvalidLocation(msg) => ServiceError::InvalidLocation(msg),
            other => ServiceError::InvalidLocation(other.to_string()),
        }
    }
}
