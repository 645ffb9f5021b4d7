//! Error types for async validation.
//!
//! Every failure reported by a validator ends up as one [`ErrorDetail`]. A run
//! collects them into a single [`AsyncValidationError`], which is what callers
//! see (wrapped in [`Error::Validation`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;

/// Boxed error used for fatal validator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Location segment used for failures reported by model validators.
pub const ROOT_LOCATION: &str = "__root__";

/// Error kind used for every failure produced by a validator.
pub const VALUE_ERROR: &str = "value_error";

/// One step of an error location: a field name, a mapping key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocItem {
    /// Position inside a sequence
    Index(usize),
    /// Field name or mapping key
    Key(String),
}

impl LocItem {
    /// The marker segment used for model-level failures.
    pub fn root() -> Self {
        LocItem::Key(ROOT_LOCATION.to_string())
    }

    /// Whether this is the model-level marker segment.
    pub fn is_root(&self) -> bool {
        matches!(self, LocItem::Key(key) if key == ROOT_LOCATION)
    }
}

impl fmt::Display for LocItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocItem::Index(index) => write!(f, "{}", index),
            LocItem::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for LocItem {
    fn from(key: &str) -> Self {
        LocItem::Key(key.to_string())
    }
}

impl From<String> for LocItem {
    fn from(key: String) -> Self {
        LocItem::Key(key)
    }
}

impl From<usize> for LocItem {
    fn from(index: usize) -> Self {
        LocItem::Index(index)
    }
}

/// An ordered path of [`LocItem`]s.
///
/// Used as the prefix applied when errors bubble up through nested models and
/// at the request boundary. A single segment converts into a one-item location.
///
/// ```rust,ignore
/// let prefix = Location::from("body");
/// let nested = Location::from("items").child(0).child("name");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(Vec<LocItem>);

impl Location {
    /// Create an empty location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this location extended by one segment.
    pub fn child(&self, item: impl Into<LocItem>) -> Self {
        let mut items = self.0.clone();
        items.push(item.into());
        Self(items)
    }

    /// Append a segment in place.
    pub fn push(&mut self, item: impl Into<LocItem>) {
        self.0.push(item.into());
    }

    /// Consume the location, returning its segments.
    pub fn into_vec(self) -> Vec<LocItem> {
        self.0
    }
}

impl Deref for Location {
    type Target = [LocItem];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl From<LocItem> for Location {
    fn from(item: LocItem) -> Self {
        Self(vec![item])
    }
}

impl From<&str> for Location {
    fn from(key: &str) -> Self {
        Self(vec![key.into()])
    }
}

impl From<String> for Location {
    fn from(key: String) -> Self {
        Self(vec![key.into()])
    }
}

impl From<usize> for Location {
    fn from(index: usize) -> Self {
        Self(vec![index.into()])
    }
}

impl From<Vec<LocItem>> for Location {
    fn from(items: Vec<LocItem>) -> Self {
        Self(items)
    }
}

impl From<&[LocItem]> for Location {
    fn from(items: &[LocItem]) -> Self {
        Self(items.to_vec())
    }
}

impl<const N: usize> From<[LocItem; N]> for Location {
    fn from(items: [LocItem; N]) -> Self {
        Self(items.into())
    }
}

impl FromIterator<LocItem> for Location {
    fn from_iter<I: IntoIterator<Item = LocItem>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A single located validation failure.
///
/// Serializes with the same keys the schema layer and the request boundary use:
///
/// ```json
/// {"type": "value_error", "loc": ["items", 0, "name"], "msg": "Invalid name", "input": "invalid"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error kind (`value_error` for validator failures)
    #[serde(rename = "type")]
    pub kind: String,
    /// Path to the failing value
    pub loc: Vec<LocItem>,
    /// Human-readable message
    pub msg: String,
    /// The offending value
    #[serde(default)]
    pub input: Value,
}

impl ErrorDetail {
    /// Create an error entry of an arbitrary kind.
    pub fn new(
        kind: impl Into<String>,
        loc: impl Into<Location>,
        msg: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            loc: loc.into().into_vec(),
            msg: msg.into(),
            input,
        }
    }

    /// Create a `value_error` entry.
    pub fn value_error(loc: impl Into<Location>, msg: impl Into<String>, input: Value) -> Self {
        Self::new(VALUE_ERROR, loc, msg, input)
    }

    /// Create a `value_error` entry for a model-level failure.
    pub fn root(msg: impl Into<String>, input: Value) -> Self {
        Self::value_error(LocItem::root(), msg, input)
    }

    /// Whether this entry was reported by a model validator.
    pub fn is_root(&self) -> bool {
        self.loc.last().map_or(false, LocItem::is_root)
    }

    /// Return this entry with `prefix` placed in front of its location.
    pub fn prefixed(mut self, prefix: &[LocItem]) -> Self {
        if !prefix.is_empty() {
            let mut loc = prefix.to_vec();
            loc.append(&mut self.loc);
            self.loc = loc;
        }
        self
    }
}

/// Aggregate error returned by one validation run.
///
/// Carries every located failure collected from the model and its nested
/// models, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncValidationError {
    model: String,
    errors: Vec<ErrorDetail>,
}

impl AsyncValidationError {
    /// Create an aggregate error for `model`.
    pub fn new(model: impl Into<String>, errors: Vec<ErrorDetail>) -> Self {
        Self {
            model: model.into(),
            errors,
        }
    }

    /// Name of the top-level model type that was validated.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The collected error entries.
    pub fn errors(&self) -> &[ErrorDetail] {
        &self.errors
    }

    /// Consume the error, returning its entries.
    pub fn into_errors(self) -> Vec<ErrorDetail> {
        self.errors
    }

    /// Number of collected entries.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no entries were collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Locations of all entries, in order.
    pub fn locations(&self) -> Vec<&[LocItem]> {
        self.errors.iter().map(|e| e.loc.as_slice()).collect()
    }
}

impl fmt::Display for AsyncValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} validation error(s)", self.model, self.errors.len())
    }
}

impl std::error::Error for AsyncValidationError {}

impl Serialize for AsyncValidationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.errors.serialize(serializer)
    }
}

/// Failure reported by a single validator.
///
/// `Invalid` marks the value as rejected; the engine records it and keeps
/// going. `Fatal` means the validator itself broke; the run stops and the
/// error propagates unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    /// The validated value was rejected
    #[error("{0}")]
    Invalid(String),
    /// The validator could not complete
    #[error("{0}")]
    Fatal(#[source] BoxError),
}

impl ValidatorError {
    /// Reject the validated value with a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        ValidatorError::Invalid(message.into())
    }

    /// Abort the run with an unexpected error.
    pub fn fatal(error: impl Into<BoxError>) -> Self {
        ValidatorError::Fatal(error.into())
    }

    /// Whether this is a rejection rather than a fatal failure.
    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidatorError::Invalid(_))
    }
}

impl From<String> for ValidatorError {
    fn from(message: String) -> Self {
        ValidatorError::Invalid(message)
    }
}

impl From<&str> for ValidatorError {
    fn from(message: &str) -> Self {
        ValidatorError::Invalid(message.to_string())
    }
}

impl From<crate::schema::RuleError> for ValidatorError {
    fn from(error: crate::schema::RuleError) -> Self {
        ValidatorError::Invalid(error.interpolate_message())
    }
}

/// Malformed validator declaration, detected while a registry is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// A field validator was declared without any field name
    #[error("field validator `{validator}` on `{model}` must name at least one field, e.g. `#[field_validator(\"name\")]`")]
    MissingFieldName { model: String, validator: String },
    /// A field validator names an empty field
    #[error("field validator `{validator}` on `{model}` names an empty field")]
    EmptyFieldName { model: String, validator: String },
    /// Two validators of the same kind share a name on one model
    #[error("{kind} validator `{validator}` is declared more than once on `{model}`")]
    DuplicateValidator {
        model: String,
        validator: String,
        kind: &'static str,
    },
}

/// Error returned by [`AsyncValidate::validate_async`](crate::AsyncValidate::validate_async).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// One or more validators rejected the model
    #[error(transparent)]
    Validation(#[from] AsyncValidationError),
    /// A validator failed with an unexpected error
    #[error("validator `{validator}` on `{model}` failed: {source}")]
    Fatal {
        model: String,
        validator: String,
        #[source]
        source: BoxError,
    },
    /// The model could not be serialized to read its field values
    #[error("failed to read field values of `{model}`: {source}")]
    Snapshot {
        model: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// The aggregate validation error, if this is one.
    pub fn as_validation(&self) -> Option<&AsyncValidationError> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }

    /// Convert into the aggregate validation error, if this is one.
    pub fn into_validation(self) -> Result<AsyncValidationError, Self> {
        match self {
            Error::Validation(err) => Ok(err),
            other => Err(other),
        }
    }

    /// Whether this error reports rejected values (as opposed to a failure).
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_display_joins_segments() {
        let loc = Location::from("items").child(0).child("name");
        assert_eq!(loc.to_string(), "items.0.name");
        assert_eq!(loc.len(), 3);
    }

    #[test]
    fn loc_items_serialize_untagged() {
        let detail = ErrorDetail::value_error(
            Location::from("seq").child(2).child("field"),
            "bad",
            json!(3),
        );
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["type"], "value_error");
        assert_eq!(value["loc"], json!(["seq", 2, "field"]));
        assert_eq!(value["msg"], "bad");
        assert_eq!(value["input"], 3);

        let back: ErrorDetail = serde_json::from_value(value).unwrap();
        assert_eq!(back, detail);
    }

    #[test]
    fn root_entries_are_marked() {
        let detail = ErrorDetail::root("broken", json!({"id": 1}));
        assert!(detail.is_root());
        assert_eq!(detail.loc, vec![LocItem::Key("__root__".to_string())]);

        let nested = detail.prefixed(&[LocItem::from("child")]);
        assert!(nested.is_root());
        assert_eq!(nested.loc.len(), 2);
    }

    #[test]
    fn prefixed_with_empty_prefix_is_unchanged() {
        let detail = ErrorDetail::value_error("name", "bad", Value::Null);
        assert_eq!(detail.clone().prefixed(&[]), detail);
    }

    #[test]
    fn aggregate_display_and_serialization() {
        let error = AsyncValidationError::new(
            "User",
            vec![
                ErrorDetail::value_error("name", "Invalid name", json!("invalid")),
                ErrorDetail::root("missing id", json!({})),
            ],
        );
        assert_eq!(error.to_string(), "User: 2 validation error(s)");

        let value = serde_json::to_value(&error).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["loc"], json!(["name"]));
        assert_eq!(value[1]["loc"], json!(["__root__"]));
    }

    #[test]
    fn validator_error_conversions() {
        let err: ValidatorError = "Invalid name".into();
        assert!(err.is_invalid());
        assert_eq!(err.to_string(), "Invalid name");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = ValidatorError::fatal(io);
        assert!(!err.is_invalid());
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn error_into_validation() {
        let err = Error::from(AsyncValidationError::new("User", vec![]));
        assert!(err.is_validation());
        assert!(err.into_validation().is_ok());

        let err = Error::Fatal {
            model: "User".to_string(),
            validator: "check".to_string(),
            source: "boom".into(),
        };
        assert!(err.as_validation().is_none());
        assert_eq!(err.to_string(), "validator `check` on `User` failed: boom");
    }
}
