//! Conversions between error shapes.
//!
//! Both the schema layer's [`FieldError`]s and this crate's [`ErrorDetail`]s
//! normalize into `ErrorDetail`, which is what the request boundary and
//! [`prefix_errors`] work with.

use crate::error::{AsyncValidationError, Error, ErrorDetail, LocItem, Location};
use crate::schema::{FieldError, RuleError, ValidationErrors};
use serde_json::Value;

/// Place `prefix` in front of the location of every error.
///
/// Accepts anything that normalizes into [`ErrorDetail`]: this crate's own
/// entries as well as the schema layer's [`FieldError`]s.
///
/// ```rust,ignore
/// let errors = prefix_errors(&["body".into()], err.into_errors());
/// assert_eq!(errors[0].loc, ["body".into(), "name".into()]);
/// ```
pub fn prefix_errors<I>(prefix: &[LocItem], errors: I) -> Vec<ErrorDetail>
where
    I: IntoIterator,
    I::Item: Into<ErrorDetail>,
{
    errors
        .into_iter()
        .map(|error| error.into().prefixed(prefix))
        .collect()
}

/// Split a dotted field path into location segments.
///
/// Numeric segments become indexes. Dotted paths cannot tell a mapping key
/// from an index or keep a `.` inside a key, so a key `"0"` comes back as
/// index `0` and a key `"a.b"` as the two segments `a` and `b`.
pub fn parse_field_path(path: &str) -> Location {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => LocItem::Index(index),
            Err(_) => LocItem::from(segment),
        })
        .collect()
}

impl From<FieldError> for ErrorDetail {
    fn from(error: FieldError) -> Self {
        let input = error
            .params
            .as_ref()
            .and_then(|params| params.get("value").cloned())
            .unwrap_or(Value::Null);
        ErrorDetail::new(error.code, parse_field_path(&error.field), error.message, input)
    }
}

impl From<ErrorDetail> for FieldError {
    fn from(detail: ErrorDetail) -> Self {
        let params = if detail.input.is_null() {
            None
        } else {
            Some([("value".to_string(), detail.input)].into_iter().collect())
        };
        FieldError {
            field: Location::from(detail.loc).to_string(),
            code: detail.kind,
            message: detail.msg,
            params,
        }
    }
}

impl AsyncValidationError {
    /// Normalize the schema layer's native errors.
    pub fn from_validation_errors(model: impl Into<String>, native: ValidationErrors) -> Self {
        AsyncValidationError::new(model, native.entries().into_iter().map(Into::into).collect())
    }

    /// Convert into the schema layer's native shape, keyed by dotted location.
    ///
    /// Locations are joined with `.`, see [`parse_field_path`] for what does
    /// not survive the way back.
    pub fn into_validation_errors(self) -> ValidationErrors {
        let mut native = ValidationErrors::new();
        for detail in self.into_errors() {
            let field = Location::from(detail.loc).to_string();
            let mut rule = RuleError::new(detail.kind, detail.msg);
            if !detail.input.is_null() {
                rule = rule.param("value", detail.input);
            }
            native.add(field, rule);
        }
        native
    }
}

/// Errors that carry located validation failures.
///
/// Converts an error into its entries, or hands it back unchanged when it is
/// some other kind of failure.
pub trait ValidationFailure: Sized {
    fn into_error_details(self) -> Result<Vec<ErrorDetail>, Self>;
}

impl ValidationFailure for Error {
    fn into_error_details(self) -> Result<Vec<ErrorDetail>, Self> {
        self.into_validation().map(AsyncValidationError::into_errors)
    }
}

impl ValidationFailure for AsyncValidationError {
    fn into_error_details(self) -> Result<Vec<ErrorDetail>, Self> {
        Ok(self.into_errors())
    }
}

impl ValidationFailure for ValidationErrors {
    fn into_error_details(self) -> Result<Vec<ErrorDetail>, Self> {
        Ok(self.entries().into_iter().map(Into::into).collect())
    }
}
