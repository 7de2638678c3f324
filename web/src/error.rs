use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;
use sse::connection::RegistryError;

/// Body returned to anything other than an EventSource client.
pub const INVALID_SUBSCRIPTION_MESSAGE: &str = "This path for EventSource subscription only...";

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The request did not declare `Accept: text/event-stream`.
    InvalidSubscriptionRequest,
    /// The connection registry refused the connection: either the server is
    /// shutting down or a freshly generated identity collided.
    Registry(RegistryError),
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::InvalidSubscriptionRequest => write!(fmt, "invalid subscription request"),
            Error::Registry(e) => write!(fmt, "connection not registered: {e}"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::InvalidSubscriptionRequest => {
                debug!("Rejected event stream request without text/event-stream accept type");
                (StatusCode::INTERNAL_SERVER_ERROR, INVALID_SUBSCRIPTION_MESSAGE).into_response()
            }
            Error::Registry(RegistryError::Closed) => {
                info!("Refused event stream request during shutdown");
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE UNAVAILABLE").into_response()
            }
            Error::Registry(e) => {
                error!("Connection registry invariant violated: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}
