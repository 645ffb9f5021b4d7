//! Validation engine.
//!
//! Runs a model's field validators, then its model validators, then the same
//! for every nested model, and folds all failures into one
//! [`AsyncValidationError`].

use crate::error::{AsyncValidationError, Error, ErrorDetail, Location, ValidatorError};
use crate::registry::ValidatorRegistry;
use crate::schema::Validate;
use crate::signature::{FieldArgs, ModelArgs};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::any::TypeId;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// A model type carrying async validators.
///
/// Usually implemented by `#[async_validators]`. A manual implementation
/// provides the registry and, when the model holds other models, its children:
///
/// ```rust,ignore
/// impl AsyncModel for Order {
///     fn registry() -> &'static ValidatorRegistry<Self> {
///         static REGISTRY: OnceLock<ValidatorRegistry<Order>> = OnceLock::new();
///         REGISTRY.get_or_init(|| ValidatorRegistry::builder().build().unwrap())
///     }
///
///     fn children(&self) -> Children<'_> {
///         let mut children = Children::new();
///         children.nested("lines", &self.lines);
///         children
///     }
/// }
/// ```
pub trait AsyncModel: Serialize + Send + Sync + Sized + 'static {
    /// The composed validators of this type.
    fn registry() -> &'static ValidatorRegistry<Self>;

    /// Nested models to validate after this one, in declaration order.
    fn children(&self) -> Children<'_> {
        Children::new()
    }
}

/// Async validation entry point.
///
/// Implemented for every [`AsyncModel`].
#[async_trait]
pub trait AsyncValidate: Send + Sync {
    /// Run all async validators of this instance and of its nested models.
    ///
    /// Returns [`Error::Validation`] with every collected failure, or
    /// [`Error::Fatal`] as soon as a validator breaks.
    async fn validate_async(&self) -> Result<(), Error>;

    #[doc(hidden)]
    async fn validate_in(&self, scope: &mut VisitScope) -> Result<(), Error>;
}

#[async_trait]
impl<M: AsyncModel> AsyncValidate for M {
    async fn validate_async(&self) -> Result<(), Error> {
        let mut scope = VisitScope::default();
        scope.enter(visit_key(self));
        let result = run(self, &mut scope).await;
        scope.leave();
        result
    }

    async fn validate_in(&self, scope: &mut VisitScope) -> Result<(), Error> {
        run(self, scope).await
    }
}

/// Run structural validation, then async validation.
///
/// Structural failures are normalized into an [`AsyncValidationError`] and
/// returned without running any async validator.
pub async fn validate_full<M>(model: &M) -> Result<(), Error>
where
    M: AsyncModel + Validate,
{
    if let Err(native) = model.validate() {
        trace_debug!(
            model = short_type_name::<M>(),
            errors = native.len(),
            "structural validation failed, async validators not run"
        );
        return Err(AsyncValidationError::from_validation_errors(short_type_name::<M>(), native).into());
    }
    model.validate_async().await
}

type VisitKey = (usize, TypeId);

fn visit_key<M: 'static>(model: &M) -> VisitKey {
    (model as *const M as usize, TypeId::of::<M>())
}

/// Models currently being validated on the path from the top-level model.
#[doc(hidden)]
#[derive(Debug, Default)]
pub struct VisitScope {
    path: Vec<VisitKey>,
}

impl VisitScope {
    fn enter(&mut self, key: VisitKey) -> bool {
        if self.path.contains(&key) {
            return false;
        }
        self.path.push(key);
        true
    }

    fn leave(&mut self) {
        self.path.pop();
    }
}

struct Child<'a> {
    path: Location,
    key: VisitKey,
    model: &'a dyn AsyncValidate,
}

/// Nested models of one instance, each with its location relative to it.
#[derive(Default)]
pub struct Children<'a> {
    items: Vec<Child<'a>>,
}

impl<'a> Children<'a> {
    /// No children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one nested model at `path`.
    pub fn push<M: AsyncModel>(&mut self, path: impl Into<Location>, model: &'a M) {
        self.items.push(Child {
            path: path.into(),
            key: visit_key(model),
            model,
        });
    }

    /// Add every model reachable from the attribute `name`.
    pub fn nested<T: Nested + ?Sized>(&mut self, name: &str, value: &'a T) {
        value.collect_into(Location::from(name), self);
    }

    /// Append the children collected by another instance (an embedded base).
    pub fn extend(&mut self, other: Children<'a>) {
        self.items.extend(other.items);
    }

    /// Number of collected children.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no child was collected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Locations of the collected children, in order.
    pub fn paths(&self) -> Vec<&Location> {
        self.items.iter().map(|c| &c.path).collect()
    }
}

impl fmt::Debug for Children<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.paths()).finish()
    }
}

/// Attribute values that may contain nested models.
///
/// Sequences and sets add the element index to the location, mappings add the
/// key. `Option`, `Box` and `Arc` are transparent.
pub trait Nested {
    /// Add every model contained in `self` to `children`, located under `path`.
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>);
}

impl<T: Nested> Nested for [T] {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        for (index, item) in self.iter().enumerate() {
            item.collect_into(path.child(index), children);
        }
    }
}

impl<T: Nested, const N: usize> Nested for [T; N] {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        self.as_slice().collect_into(path, children);
    }
}

impl<T: Nested> Nested for Vec<T> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        self.as_slice().collect_into(path, children);
    }
}

impl<T: Nested> Nested for VecDeque<T> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        for (index, item) in self.iter().enumerate() {
            item.collect_into(path.child(index), children);
        }
    }
}

impl<T: Nested> Nested for Option<T> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        if let Some(inner) = self {
            inner.collect_into(path, children);
        }
    }
}

impl<T: Nested + ?Sized> Nested for Box<T> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        (**self).collect_into(path, children);
    }
}

impl<T: Nested + ?Sized> Nested for Arc<T> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        (**self).collect_into(path, children);
    }
}

// Keys are visited in sorted order so repeated runs report identically.
impl<K: fmt::Display, T: Nested, S> Nested for HashMap<K, T, S> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        let mut entries: Vec<(String, &'a T)> =
            self.iter().map(|(key, value)| (key.to_string(), value)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in entries {
            value.collect_into(path.child(key), children);
        }
    }
}

impl<K: fmt::Display, T: Nested> Nested for BTreeMap<K, T> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        for (key, value) in self {
            value.collect_into(path.child(key.to_string()), children);
        }
    }
}

impl<T: Nested> Nested for BTreeSet<T> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        for (index, item) in self.iter().enumerate() {
            item.collect_into(path.child(index), children);
        }
    }
}

// Indexed in sorted order, like `BTreeSet`.
impl<T: Nested + Ord, S> Nested for HashSet<T, S> {
    fn collect_into<'a>(&'a self, path: Location, children: &mut Children<'a>) {
        let mut items: Vec<&'a T> = self.iter().collect();
        items.sort();
        for (index, item) in items.into_iter().enumerate() {
            item.collect_into(path.child(index), children);
        }
    }
}

/// Type name without module path or generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Serialized form of the model, taken at most once per run.
struct Snapshot<'m, M> {
    model: &'m M,
    value: Option<Value>,
}

impl<'m, M: AsyncModel> Snapshot<'m, M> {
    fn new(model: &'m M) -> Self {
        Self { model, value: None }
    }

    fn get(&mut self) -> Result<&Value, Error> {
        if self.value.is_none() {
            let value = serde_json::to_value(self.model).map_err(|source| Error::Snapshot {
                model: short_type_name::<M>().to_string(),
                source,
            })?;
            self.value = Some(value);
        }
        Ok(self.value.get_or_insert(Value::Null))
    }
}

async fn run<M: AsyncModel>(model: &M, scope: &mut VisitScope) -> Result<(), Error> {
    let name = short_type_name::<M>();
    let registry = M::registry();
    let mut snapshot = Snapshot::new(model);
    let mut errors: Vec<ErrorDetail> = Vec::new();

    trace_debug!(
        model = name,
        field_validators = registry.field_validators().len(),
        model_validators = registry.model_validators().len(),
        "running async validators"
    );

    for binding in registry.field_validators() {
        for field in binding.fields() {
            let value = match binding.read(model, field) {
                Some(Ok(value)) => Cow::Owned(value),
                Some(Err(source)) => {
                    return Err(Error::Snapshot {
                        model: name.to_string(),
                        source,
                    })
                }
                None => Cow::Borrowed(snapshot.get()?.get(field.as_str()).unwrap_or(&NULL)),
            };
            let args = FieldArgs::new(&value, field, binding.record());
            match binding.call().call(model, args).await {
                Ok(()) => {}
                Err(ValidatorError::Invalid(msg)) => {
                    errors.push(ErrorDetail::value_error(field.as_str(), msg, value.into_owned()));
                }
                Err(ValidatorError::Fatal(source)) => {
                    trace_warn!(
                        model = name,
                        validator = binding.record().name(),
                        field = field.as_str(),
                        "field validator failed, aborting"
                    );
                    return Err(Error::Fatal {
                        model: name.to_string(),
                        validator: binding.record().name().to_string(),
                        source,
                    });
                }
            }
        }
    }

    for binding in registry.model_validators() {
        if binding.record().skip_on_failure() && !errors.is_empty() {
            trace_trace!(
                model = name,
                validator = binding.record().name(),
                "skipping model validator after field errors"
            );
            continue;
        }
        match binding.call().call(model, ModelArgs::new(binding.record())).await {
            Ok(()) => {}
            Err(ValidatorError::Invalid(msg)) => {
                errors.push(ErrorDetail::root(msg, snapshot.get()?.clone()));
            }
            Err(ValidatorError::Fatal(source)) => {
                trace_warn!(
                    model = name,
                    validator = binding.record().name(),
                    "model validator failed, aborting"
                );
                return Err(Error::Fatal {
                    model: name.to_string(),
                    validator: binding.record().name().to_string(),
                    source,
                });
            }
        }
    }

    let children = model.children();
    for child in children.items {
        if !scope.enter(child.key) {
            trace_debug!(model = name, path = %child.path, "nested model already on the validation path");
            continue;
        }
        let result = child.model.validate_in(scope).await;
        scope.leave();
        match result {
            Ok(()) => {}
            Err(Error::Validation(nested)) => {
                errors.extend(nested.into_errors().into_iter().map(|e| e.prefixed(&child.path)));
            }
            Err(other) => return Err(other),
        }
    }

    if errors.is_empty() {
        trace_trace!(model = name, "async validation passed");
        Ok(())
    } else {
        trace_debug!(model = name, errors = errors.len(), "async validation failed");
        Err(AsyncValidationError::new(name, errors).into())
    }
}
