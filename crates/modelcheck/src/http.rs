//! Request boundary: turn validation failures into `422 Unprocessable Entity`.
//!
//! ```rust,ignore
//! use modelcheck::http::ensure_request_validation_errors;
//!
//! async fn create_user(payload: User) -> http::Response<String> {
//!     let result = ensure_request_validation_errors()
//!         .with_prefix("body")
//!         .run(payload.validate_async())
//!         .await;
//!     match result {
//!         Ok(()) => http::Response::new("created".to_string()),
//!         Err(Rejection::Validation(err)) => err.into_response(),
//!         Err(Rejection::Other(err)) => internal_error(err),
//!     }
//! }
//! ```
//!
//! Response body:
//!
//! ```json
//! {
//!   "error": {
//!     "type": "validation_error",
//!     "message": "Request validation failed",
//!     "fields": [
//!       {"type": "value_error", "loc": ["body", "name"], "msg": "Invalid name", "input": "invalid"}
//!     ]
//!   }
//! }
//! ```

use crate::adapter::{prefix_errors, ValidationFailure};
use crate::error::{ErrorDetail, Location};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use serde::Serialize;
use std::fmt;
use std::future::Future;

/// Validation failure of an incoming request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Request validation failed: {} error(s)", .errors.len())]
pub struct RequestValidationError {
    errors: Vec<ErrorDetail>,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: &'static str,
    fields: &'a [ErrorDetail],
}

impl RequestValidationError {
    /// Wrap already located entries.
    pub fn new(errors: Vec<ErrorDetail>) -> Self {
        Self { errors }
    }

    /// Always `422 Unprocessable Entity`.
    pub fn status(&self) -> StatusCode {
        StatusCode::UNPROCESSABLE_ENTITY
    }

    /// The located entries, in report order.
    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }

    /// Take the located entries.
    pub fn into_errors(self) -> Vec<ErrorDetail> {
        self.errors
    }

    /// JSON body of the error response.
    pub fn to_body(&self) -> String {
        let response = ErrorResponse {
            error: ErrorBody {
                error_type: "validation_error",
                message: "Request validation failed",
                fields: &self.errors,
            },
        };
        serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"error":{"type":"internal_error","message":"Failed to serialize error"}}"#
                .to_string()
        })
    }

    /// Build the `422` JSON response.
    pub fn into_response(self) -> Response<String> {
        let mut response = Response::new(self.to_body());
        *response.status_mut() = self.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

impl From<RequestValidationError> for Response<String> {
    fn from(err: RequestValidationError) -> Self {
        err.into_response()
    }
}

/// Outcome of a guarded request operation that did not succeed.
#[derive(Debug)]
pub enum Rejection<E> {
    /// The request failed validation
    Validation(RequestValidationError),
    /// Any other failure, unchanged
    Other(E),
}

impl<E> Rejection<E> {
    /// Whether the request failed validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Rejection::Validation(_))
    }

    /// The passed-through error, if this is not a validation failure.
    pub fn into_other(self) -> Option<E> {
        match self {
            Rejection::Other(err) => Some(err),
            Rejection::Validation(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Rejection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Validation(err) => write!(f, "{}", err),
            Rejection::Other(err) => write!(f, "{}", err),
        }
    }
}

impl<E> std::error::Error for Rejection<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Rejection::Validation(err) => Some(err),
            Rejection::Other(err) => Some(err),
        }
    }
}

/// Scope converting validation failures into [`RequestValidationError`].
#[derive(Debug, Clone, Default)]
pub struct RequestValidationScope {
    prefix: Location,
}

/// Guard a request operation: validation failures become
/// [`RequestValidationError`], everything else passes through.
pub fn ensure_request_validation_errors() -> RequestValidationScope {
    RequestValidationScope::default()
}

impl RequestValidationScope {
    /// Prefix every location, e.g. `"body"` or `["body", "user"]`.
    pub fn with_prefix(mut self, prefix: impl Into<Location>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Prefix applied to every location.
    pub fn prefix(&self) -> &Location {
        &self.prefix
    }

    /// Translate one error.
    pub fn convert<E: ValidationFailure>(&self, err: E) -> Rejection<E> {
        match err.into_error_details() {
            Ok(details) => {
                trace_debug!(
                    errors = details.len(),
                    prefix = %self.prefix,
                    "request validation failed"
                );
                Rejection::Validation(RequestValidationError::new(prefix_errors(&self.prefix, details)))
            }
            Err(other) => Rejection::Other(other),
        }
    }

    /// Await `operation`, translating its error.
    pub async fn run<T, E, F>(self, operation: F) -> Result<T, Rejection<E>>
    where
        E: ValidationFailure,
        F: Future<Output = Result<T, E>>,
    {
        operation.await.map_err(|err| self.convert(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AsyncValidationError, Error, LocItem};
    use crate::schema::{RuleError, ValidationErrors};
    use serde_json::{json, Value};

    fn failing() -> AsyncValidationError {
        AsyncValidationError::new(
            "User",
            vec![ErrorDetail::value_error("name", "Invalid name", json!("invalid"))],
        )
    }

    #[test]
    fn response_is_422_json() {
        let err = ensure_request_validation_errors()
            .convert(failing())
            .into_validation_or_panic();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body: Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["error"]["type"], "validation_error");
        assert_eq!(body["error"]["message"], "Request validation failed");
        assert_eq!(body["error"]["fields"][0]["loc"], json!(["name"]));
        assert_eq!(body["error"]["fields"][0]["type"], "value_error");
    }

    #[test]
    fn prefix_is_applied() {
        let err = ensure_request_validation_errors()
            .with_prefix("body")
            .convert(failing())
            .into_validation_or_panic();
        assert_eq!(
            err.errors()[0].loc,
            vec![LocItem::from("body"), LocItem::from("name")]
        );

        let err = ensure_request_validation_errors()
            .with_prefix([LocItem::from("body"), LocItem::from("user")])
            .convert(failing())
            .into_validation_or_panic();
        assert_eq!(err.errors()[0].loc.len(), 3);
    }

    #[test]
    fn native_errors_are_converted() {
        let mut native = ValidationErrors::new();
        native.add("email", RuleError::new("email", "Invalid email"));
        let err = ensure_request_validation_errors()
            .with_prefix("query")
            .convert(native)
            .into_validation_or_panic();
        assert_eq!(err.errors()[0].kind, "email");
        assert_eq!(
            err.errors()[0].loc,
            vec![LocItem::from("query"), LocItem::from("email")]
        );
    }

    #[tokio::test]
    async fn other_errors_pass_through() {
        let result: Result<(), Rejection<Error>> = ensure_request_validation_errors()
            .run(async {
                Err(Error::Fatal {
                    model: "User".to_string(),
                    validator: "check".to_string(),
                    source: "db down".into(),
                })
            })
            .await;
        let rejection = result.unwrap_err();
        assert!(!rejection.is_validation());
        assert!(matches!(rejection.into_other(), Some(Error::Fatal { .. })));

        let ok: Result<u8, Rejection<Error>> =
            ensure_request_validation_errors().run(async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    impl<E> Rejection<E> {
        fn into_validation_or_panic(self) -> RequestValidationError {
            match self {
                Rejection::Validation(err) => err,
                Rejection::Other(_) => panic!("expected a validation rejection"),
            }
        }
    }
}
