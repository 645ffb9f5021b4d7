//! Validator records.

use serde_json::{Map, Value};

/// Free-form options attached to a validator at declaration time.
pub type Extra = Map<String, Value>;

/// Immutable description of one declared validator.
///
/// A record is created when a validator is declared and never changes
/// afterwards. The engine hands it to the validator on every call as its
/// `config` argument, so a validator can read the options it was declared with:
///
/// ```rust,ignore
/// #[field_validator("name", table = "users")]
/// async fn unique_name(&self, value: String, config: &ValidatorRecord) -> Result<(), ValidatorError> {
///     let table = config.extra()["table"].as_str().unwrap_or("users");
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatorRecord {
    name: String,
    doc: Option<String>,
    extra: Extra,
    skip_on_failure: bool,
}

impl ValidatorRecord {
    /// Create a record for the validator called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach the documentation of the declaring function.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Add one extra option.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Replace all extra options.
    pub fn with_extras(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    /// Skip this (model) validator when a field validator already failed.
    pub fn with_skip_on_failure(mut self, skip: bool) -> Self {
        self.skip_on_failure = skip;
        self
    }

    /// Name of the declaring function.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation of the declaring function, if any.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Extra options given at declaration time.
    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    /// Whether the validator is skipped after a field-level failure.
    pub fn skip_on_failure(&self) -> bool {
        self.skip_on_failure
    }
}
