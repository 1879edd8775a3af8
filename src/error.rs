use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("Missing credential")]
    MissingCredential,

    #[error("{0}")]
    Forbidden(ForbiddenType),

    #[error("No resource found")]
    NoResource,

    #[error("Parcel not found or unauthorized")]
    NotFoundOrUnauthorized,

    #[error("{0}")]
    DatabaseError(#[from] mongodb::error::Error),

    #[error("{0}")]
    BSONSerError(#[from] bson::ser::Error),

    #[error("payment gateway error: {0}")]
    PaymentGatewayError(anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ForbiddenType {
    #[error("Invalid credential")]
    InvalidCredential,

    #[error("You have no permission to access this resource")]
    NoPermission,

    #[error("Email does not match the credential")]
    EmailMismatch,
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        Self::Forbidden(ForbiddenType::InvalidCredential)
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::PaymentGatewayError(value.into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<serde_json::Value>,
    r#type: String,
    message: String,
}

impl From<Error> for ErrorJson {
    fn from(err: Error) -> Self {
        let message = match &err {
            // original error stays server-side only
            Error::DatabaseError(..) | Error::BSONSerError(..) | Error::PaymentGatewayError(..) => {
                "Server error".to_string()
            }
            err => err.to_string(),
        };

        let r#type = err.to_string_variant();

        let errors = match err {
            Error::ValidationError(err) => serde_json::to_value(err).ok(),
            _ => None,
        };

        Self {
            errors,
            message,
            r#type,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("error: {:?}", self);
        let status = match self {
            Self::MissingCredential => StatusCode::UNAUTHORIZED,
            Self::Forbidden(..) => StatusCode::FORBIDDEN,
            Self::ValidationError(..) | Self::MissingField(..) => StatusCode::BAD_REQUEST,
            Self::NoResource | Self::NotFoundOrUnauthorized => StatusCode::NOT_FOUND,
            Self::DatabaseError(..) | Self::BSONSerError(..) | Self::PaymentGatewayError(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let error = ErrorJson::from(self);

        (status, Json(error)).into_response()
    }
}

impl Error {
    pub fn to_string_variant(&self) -> String {
        macro_rules! match_var {
            ($id:ident !) => {
                Self::$id
            };
            ($id:ident (..)) => {
                Self::$id(..)
            };
        }

        macro_rules! variant {
            ($($name:ident $tt:tt),+) => {
                match self {
                    $(
                        match_var!($name $tt) => {
                            stringify!($name)
                       }
                    )+
                }
            };
        }

        variant! {
            ValidationError(..),
            MissingField(..),
            MissingCredential!,
            Forbidden(..),
            NoResource!,
            NotFoundOrUnauthorized!,
            DatabaseError(..),
            BSONSerError(..),
            PaymentGatewayError(..)
        }
        .to_string()
    }
}

impl From<axum::extract::rejection::PathRejection> for Error {
    fn from(_value: axum::extract::rejection::PathRejection) -> Self {
        Self::NoResource
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::{Error, ForbiddenType};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::MissingCredential, StatusCode::UNAUTHORIZED),
            (
                Error::Forbidden(ForbiddenType::InvalidCredential),
                StatusCode::FORBIDDEN,
            ),
            (
                Error::Forbidden(ForbiddenType::NoPermission),
                StatusCode::FORBIDDEN,
            ),
            (Error::MissingField("email"), StatusCode::BAD_REQUEST),
            (Error::NoResource, StatusCode::NOT_FOUND),
            (Error::NotFoundOrUnauthorized, StatusCode::NOT_FOUND),
            (
                Error::PaymentGatewayError(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_server_error_message_is_generic() {
        let json = super::ErrorJson::from(Error::PaymentGatewayError(anyhow::anyhow!(
            "secret detail that must not leak"
        )));

        let value = serde_json::to_value(json).unwrap();
        assert_eq!(value["message"], "Server error");
        assert_eq!(value["type"], "PaymentGatewayError");
    }
}
