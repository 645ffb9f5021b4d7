//! The canonical calling convention for validators.
//!
//! Validators only declare the arguments they care about. Whatever shape the
//! user wrote, the registry stores a callable with one fixed signature:
//!
//! - field validators: `(model, FieldArgs { value, field, config })`
//! - model validators: `(model, ModelArgs { config })`
//!
//! `#[async_validators]` inspects each method's parameter names (`value`,
//! `field`, `config`, or the catch-all `args`) and generates the forwarding
//! wrapper. Hand-written validators take the argument object directly.

use crate::error::ValidatorError;
use crate::record::{Extra, ValidatorRecord};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Future returned by every validator.
pub type ValidatorFuture<'a> = BoxFuture<'a, Result<(), ValidatorError>>;

/// Arguments passed to a field validator.
#[derive(Debug, Clone, Copy)]
pub struct FieldArgs<'a> {
    value: &'a Value,
    field: &'a str,
    config: &'a ValidatorRecord,
}

impl<'a> FieldArgs<'a> {
    /// Bundle the arguments for one field validator call.
    pub fn new(value: &'a Value, field: &'a str, config: &'a ValidatorRecord) -> Self {
        Self {
            value,
            field,
            config,
        }
    }

    /// Current value of the field (`null` when the field is absent).
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Name of the field being validated.
    pub fn field(&self) -> &'a str {
        self.field
    }

    /// The validator's own record.
    pub fn config(&self) -> &'a ValidatorRecord {
        self.config
    }

    /// Shortcut for `config().extra()`.
    pub fn extra(&self) -> &'a Extra {
        self.config.extra()
    }

    /// Decode the field value into `T`.
    ///
    /// A value that does not fit `T` rejects the field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ValidatorError> {
        T::deserialize(self.value).map_err(|e| {
            ValidatorError::invalid(format!("field `{}` has an unexpected type: {}", self.field, e))
        })
    }

    /// Borrow the field value as a string.
    pub fn decode_str(&self) -> Result<&'a str, ValidatorError> {
        self.value.as_str().ok_or_else(|| {
            ValidatorError::invalid(format!(
                "field `{}` has an unexpected type: expected a string",
                self.field
            ))
        })
    }
}

/// Arguments passed to a model validator.
#[derive(Debug, Clone, Copy)]
pub struct ModelArgs<'a> {
    config: &'a ValidatorRecord,
}

impl<'a> ModelArgs<'a> {
    /// Bundle the arguments for one model validator call.
    pub fn new(config: &'a ValidatorRecord) -> Self {
        Self { config }
    }

    /// The validator's own record.
    pub fn config(&self) -> &'a ValidatorRecord {
        self.config
    }

    /// Shortcut for `config().extra()`.
    pub fn extra(&self) -> &'a Extra {
        self.config.extra()
    }
}

/// A field validator in canonical form.
///
/// Implemented for every `Fn(&M, FieldArgs) -> ValidatorFuture` and can be
/// implemented by hand for validators that carry state:
///
/// ```rust,ignore
/// struct UniqueIn { store: Arc<dyn NameStore> }
///
/// impl FieldCall<User> for UniqueIn {
///     fn call<'a>(&'a self, _user: &'a User, args: FieldArgs<'a>) -> ValidatorFuture<'a> {
///         Box::pin(async move {
///             let name = args.decode_str()?;
///             if self.store.contains(name).await {
///                 return Err(ValidatorError::invalid("name already taken"));
///             }
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait FieldCall<M>: Send + Sync {
    /// Run the validator against one field of `model`.
    fn call<'a>(&'a self, model: &'a M, args: FieldArgs<'a>) -> ValidatorFuture<'a>;
}

impl<M, F> FieldCall<M> for F
where
    F: for<'a> Fn(&'a M, FieldArgs<'a>) -> ValidatorFuture<'a> + Send + Sync,
{
    fn call<'a>(&'a self, model: &'a M, args: FieldArgs<'a>) -> ValidatorFuture<'a> {
        (self)(model, args)
    }
}

/// A model validator in canonical form.
pub trait ModelCall<M>: Send + Sync {
    /// Run the validator against `model`.
    fn call<'a>(&'a self, model: &'a M, args: ModelArgs<'a>) -> ValidatorFuture<'a>;
}

impl<M, F> ModelCall<M> for F
where
    F: for<'a> Fn(&'a M, ModelArgs<'a>) -> ValidatorFuture<'a> + Send + Sync,
{
    fn call<'a>(&'a self, model: &'a M, args: ModelArgs<'a>) -> ValidatorFuture<'a> {
        (self)(model, args)
    }
}

/// A base model's field validator, reached through the derived model.
pub(crate) struct ProjectedField<M, B> {
    pub(crate) inner: Arc<dyn FieldCall<B>>,
    pub(crate) project: fn(&M) -> &B,
}

impl<M, B> FieldCall<M> for ProjectedField<M, B> {
    fn call<'a>(&'a self, model: &'a M, args: FieldArgs<'a>) -> ValidatorFuture<'a> {
        self.inner.call((self.project)(model), args)
    }
}

/// A base model's model validator, reached through the derived model.
pub(crate) struct ProjectedModel<M, B> {
    pub(crate) inner: Arc<dyn ModelCall<B>>,
    pub(crate) project: fn(&M) -> &B,
}

impl<M, B> ModelCall<M> for ProjectedModel<M, B> {
    fn call<'a>(&'a self, model: &'a M, args: ModelArgs<'a>) -> ValidatorFuture<'a> {
        self.inner.call((self.project)(model), args)
    }
}
