use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use teledex_core::catalog::CatalogError;
use teledex_core::resolver::ResolveError;
use thiserror::Error;
use tracing::{error, warn};

/// Every failure a handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Link resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Catalog workflow failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Request body was rejected before reaching the handler
    #[error(transparent)]
    Body(#[from] JsonRejection),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Resolve(ResolveError::InvalidLink(_)) => StatusCode::BAD_REQUEST,
            Self::Body(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::Resolve(ResolveError::EntityNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Resolve(ResolveError::Upstream(_)) => StatusCode::BAD_GATEWAY,
            Self::Catalog(e) => match e {
                CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
                CatalogError::Duplicate(_) | CatalogError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
                CatalogError::Migration(_) => StatusCode::BAD_GATEWAY,
                CatalogError::Database(_) | CatalogError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Resolve(ResolveError::InvalidLink(_)) => "invalid_link",
            Self::Resolve(ResolveError::EntityNotFound(_))
            | Self::Catalog(CatalogError::NotFound(_)) => "not_found",
            Self::Resolve(ResolveError::Upstream(_)) => "upstream_error",
            Self::Catalog(CatalogError::Duplicate(_)) => "duplicate",
            Self::Catalog(CatalogError::InvalidTransition { .. }) => "invalid_transition",
            Self::Catalog(CatalogError::Validation(_)) => "validation_error",
            Self::Catalog(CatalogError::Migration(_)) => "asset_migration_failed",
            Self::Catalog(CatalogError::Database(_) | CatalogError::Config(_)) => "internal_error",
            Self::Body(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            Self::Body(_) => "bad_request",
        }
    }

    /// Message shown to the client. Internal failures are not echoed back.
    fn public_message(&self) -> String {
        match self {
            Self::Catalog(
                CatalogError::NotFound(m) | CatalogError::Duplicate(m) | CatalogError::Validation(m),
            ) => m.clone(),
            Self::Catalog(CatalogError::Database(_) | CatalogError::Config(_)) => {
                "Internal Server Error".to_string()
            }
            Self::Body(rejection) => rejection.body_text(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            success: false,
            error: self.code(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teledex_core::catalog::ModerationStatus;

    #[test]
    fn test_resolve_errors_map_to_statuses() {
        let cases = [
            (ResolveError::InvalidLink("x".into()), StatusCode::BAD_REQUEST),
            (ResolveError::EntityNotFound("x".into()), StatusCode::NOT_FOUND),
            (ResolveError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_catalog_errors_map_to_statuses() {
        let transition = CatalogError::InvalidTransition {
            from: ModerationStatus::Approved,
            to: ModerationStatus::Pending,
        };
        assert_eq!(ApiError::from(transition).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(CatalogError::Duplicate("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(CatalogError::Validation("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CatalogError::Database("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_database_details_are_not_exposed() {
        let err = ApiError::from(CatalogError::Database("auth failed for admin".into()));
        assert_eq!(err.public_message(), "Internal Server Error");
        assert_eq!(err.code(), "internal_error");

        let err = ApiError::from(CatalogError::NotFound("Media not found".into()));
        assert_eq!(err.public_message(), "Media not found");
    }
}
