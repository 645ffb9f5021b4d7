//! Per-model validator registries.
//!
//! A registry holds the composed, ordered validator lists of one model type.
//! It is built once (see [`AsyncModel::registry`](crate::AsyncModel::registry))
//! and only read afterwards.
//!
//! ## Example
//!
//! ```rust,ignore
//! use futures_util::FutureExt;
//! use modelcheck::prelude::*;
//!
//! impl AsyncModel for User {
//!     fn registry() -> &'static ValidatorRegistry<Self> {
//!         static REGISTRY: OnceLock<ValidatorRegistry<User>> = OnceLock::new();
//!         REGISTRY.get_or_init(|| {
//!             ValidatorRegistry::builder()
//!                 .inherit(Person::registry(), |user| &user.person)
//!                 .field(FieldValidator::new("not_admin", |_user, args| {
//!                     async move {
//!                         ensure!(args.value() != "admin", "reserved name");
//!                         Ok(())
//!                     }
//!                     .boxed()
//!                 }).field("name"))
//!                 .build()
//!                 .unwrap_or_else(|err| panic!("{}", err))
//!         })
//!     }
//! }
//! ```

use crate::error::UsageError;
use crate::fields::FieldValue;
use crate::record::{Extra, ValidatorRecord};
use crate::signature::{
    FieldArgs, FieldCall, ModelArgs, ModelCall, ProjectedField, ProjectedModel, ValidatorFuture,
};
use crate::short_type_name;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Reads a field of `M` by its Rust name.
pub type FieldReader<M> = Arc<dyn Fn(&M, &str) -> FieldValue + Send + Sync>;

/// Declaration of a field validator.
pub struct FieldValidator<M> {
    fields: Vec<String>,
    record: ValidatorRecord,
    call: Arc<dyn FieldCall<M>>,
}

impl<M: 'static> FieldValidator<M> {
    /// Declare a field validator from a function or closure.
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: for<'a> Fn(&'a M, FieldArgs<'a>) -> ValidatorFuture<'a> + Send + Sync + 'static,
    {
        Self::from_call(name, call)
    }

    /// Declare a field validator from any [`FieldCall`] implementation.
    pub fn from_call(name: impl Into<String>, call: impl FieldCall<M> + 'static) -> Self {
        Self {
            fields: Vec::new(),
            record: ValidatorRecord::new(name),
            call: Arc::new(call),
        }
    }
}

impl<M> FieldValidator<M> {
    /// Scope the validator to one more field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Scope the validator to several more fields.
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add an extra option, readable through `config`.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record = self.record.with_extra(key, value);
        self
    }

    /// Replace all extra options.
    pub fn extras(mut self, extra: Extra) -> Self {
        self.record = self.record.with_extras(extra);
        self
    }

    /// Attach documentation.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.record = self.record.with_doc(doc);
        self
    }
}

/// Declaration of a model validator.
pub struct ModelValidator<M> {
    record: ValidatorRecord,
    call: Arc<dyn ModelCall<M>>,
}

impl<M: 'static> ModelValidator<M> {
    /// Declare a model validator from a function or closure.
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: for<'a> Fn(&'a M, ModelArgs<'a>) -> ValidatorFuture<'a> + Send + Sync + 'static,
    {
        Self::from_call(name, call)
    }

    /// Declare a model validator from any [`ModelCall`] implementation.
    pub fn from_call(name: impl Into<String>, call: impl ModelCall<M> + 'static) -> Self {
        Self {
            record: ValidatorRecord::new(name),
            call: Arc::new(call),
        }
    }
}

impl<M> ModelValidator<M> {
    /// Skip this validator when a field validator already failed.
    pub fn skip_on_failure(mut self, skip: bool) -> Self {
        self.record = self.record.with_skip_on_failure(skip);
        self
    }

    /// Add an extra option, readable through `config`.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.record = self.record.with_extra(key, value);
        self
    }

    /// Replace all extra options.
    pub fn extras(mut self, extra: Extra) -> Self {
        self.record = self.record.with_extras(extra);
        self
    }

    /// Attach documentation.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.record = self.record.with_doc(doc);
        self
    }
}

/// A validator declaration of either kind.
pub enum ValidatorDescriptor<M> {
    Field(FieldValidator<M>),
    Model(ModelValidator<M>),
}

impl<M> From<FieldValidator<M>> for ValidatorDescriptor<M> {
    fn from(validator: FieldValidator<M>) -> Self {
        ValidatorDescriptor::Field(validator)
    }
}

impl<M> From<ModelValidator<M>> for ValidatorDescriptor<M> {
    fn from(validator: ModelValidator<M>) -> Self {
        ValidatorDescriptor::Model(validator)
    }
}

/// A field validator bound to its fields.
pub struct FieldBinding<M> {
    fields: Arc<[String]>,
    record: Arc<ValidatorRecord>,
    call: Arc<dyn FieldCall<M>>,
    reader: Option<FieldReader<M>>,
}

impl<M> FieldBinding<M> {
    /// Fields this validator runs for, in order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The validator's record.
    pub fn record(&self) -> &ValidatorRecord {
        &self.record
    }

    /// The canonical callable.
    pub fn call(&self) -> &dyn FieldCall<M> {
        self.call.as_ref()
    }

    /// Read `field` from `model` directly.
    ///
    /// `None` when the binding has no reader or the reader does not know the
    /// field; the engine then looks the field up in the serialized snapshot.
    pub fn read(&self, model: &M, field: &str) -> FieldValue {
        self.reader.as_ref().and_then(|read| read(model, field))
    }
}

impl<M> Clone for FieldBinding<M> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            record: self.record.clone(),
            call: self.call.clone(),
            reader: self.reader.clone(),
        }
    }
}

impl<M> fmt::Debug for FieldBinding<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("fields", &self.fields)
            .field("record", &self.record)
            .field("reads_fields", &self.reader.is_some())
            .finish()
    }
}

/// A registered model validator.
pub struct ModelBinding<M> {
    record: Arc<ValidatorRecord>,
    call: Arc<dyn ModelCall<M>>,
}

impl<M> ModelBinding<M> {
    /// The validator's record.
    pub fn record(&self) -> &ValidatorRecord {
        &self.record
    }

    /// The canonical callable.
    pub fn call(&self) -> &dyn ModelCall<M> {
        self.call.as_ref()
    }
}

impl<M> Clone for ModelBinding<M> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
            call: self.call.clone(),
        }
    }
}

impl<M> fmt::Debug for ModelBinding<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBinding")
            .field("record", &self.record)
            .finish()
    }
}

/// Composed validator lists of one model type.
pub struct ValidatorRegistry<M> {
    field_validators: Vec<FieldBinding<M>>,
    model_validators: Vec<ModelBinding<M>>,
}

impl<M: 'static> ValidatorRegistry<M> {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder<M> {
        RegistryBuilder::new()
    }
}

impl<M> ValidatorRegistry<M> {
    /// A registry without validators.
    pub fn empty() -> Self {
        Self {
            field_validators: Vec::new(),
            model_validators: Vec::new(),
        }
    }

    /// Field validators: inherited ones first, then the model's own.
    pub fn field_validators(&self) -> &[FieldBinding<M>] {
        &self.field_validators
    }

    /// Model validators: inherited ones first, then the model's own.
    pub fn model_validators(&self) -> &[ModelBinding<M>] {
        &self.model_validators
    }

    /// Whether no validator is registered.
    pub fn is_empty(&self) -> bool {
        self.field_validators.is_empty() && self.model_validators.is_empty()
    }
}

impl<M> fmt::Debug for ValidatorRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("field_validators", &self.field_validators)
            .field("model_validators", &self.model_validators)
            .finish()
    }
}

/// Builder composing a registry from base registries and own declarations.
///
/// Inherited validators always precede the model's own, in the order the bases
/// were added; own validators keep their declaration order.
pub struct RegistryBuilder<M> {
    inherited_fields: Vec<FieldBinding<M>>,
    inherited_models: Vec<ModelBinding<M>>,
    declared: Vec<ValidatorDescriptor<M>>,
    reader: Option<FieldReader<M>>,
}

impl<M: 'static> RegistryBuilder<M> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            inherited_fields: Vec::new(),
            inherited_models: Vec::new(),
            declared: Vec::new(),
            reader: None,
        }
    }

    /// Append a base model's composed validators.
    ///
    /// `project` reaches the embedded base from an instance of `M`; inherited
    /// validators receive that base as their receiver.
    pub fn inherit<B: 'static>(mut self, base: &ValidatorRegistry<B>, project: fn(&M) -> &B) -> Self {
        for binding in base.field_validators() {
            let reader = binding.reader.clone().map(|read| {
                Arc::new(move |model: &M, field: &str| read(project(model), field)) as FieldReader<M>
            });
            self.inherited_fields.push(FieldBinding {
                fields: binding.fields.clone(),
                record: binding.record.clone(),
                call: Arc::new(ProjectedField {
                    inner: binding.call.clone(),
                    project,
                }),
                reader,
            });
        }
        for binding in base.model_validators() {
            self.inherited_models.push(ModelBinding {
                record: binding.record.clone(),
                call: Arc::new(ProjectedModel {
                    inner: binding.call.clone(),
                    project,
                }),
            });
        }
        self
    }

    /// Read field values for the model's own field validators with `reader`.
    ///
    /// Without a reader, values come from the serialized snapshot only, keyed
    /// by serialized name. Inherited validators keep their base's reader.
    pub fn read_fields<R>(mut self, reader: R) -> Self
    where
        R: Fn(&M, &str) -> FieldValue + Send + Sync + 'static,
    {
        self.reader = Some(Arc::new(reader));
        self
    }

    /// Declare a validator of either kind.
    pub fn declare(mut self, descriptor: impl Into<ValidatorDescriptor<M>>) -> Self {
        self.declared.push(descriptor.into());
        self
    }

    /// Declare a field validator.
    pub fn field(self, validator: FieldValidator<M>) -> Self {
        self.declare(validator)
    }

    /// Declare a model validator.
    pub fn model(self, validator: ModelValidator<M>) -> Self {
        self.declare(validator)
    }

    /// Check the declarations and compose the registry.
    pub fn build(self) -> Result<ValidatorRegistry<M>, UsageError> {
        let model = short_type_name::<M>();
        let mut field_validators = self.inherited_fields;
        let mut model_validators = self.inherited_models;
        let mut field_names = HashSet::new();
        let mut model_names = HashSet::new();

        for descriptor in self.declared {
            match descriptor {
                ValidatorDescriptor::Field(validator) => {
                    let name = validator.record.name().to_string();
                    if validator.fields.is_empty() {
                        return Err(UsageError::MissingFieldName {
                            model: model.to_string(),
                            validator: name,
                        });
                    }
                    if validator.fields.iter().any(|f| f.trim().is_empty()) {
                        return Err(UsageError::EmptyFieldName {
                            model: model.to_string(),
                            validator: name,
                        });
                    }
                    if !field_names.insert(name.clone()) {
                        return Err(UsageError::DuplicateValidator {
                            model: model.to_string(),
                            validator: name,
                            kind: "field",
                        });
                    }
                    field_validators.push(FieldBinding {
                        fields: validator.fields.into(),
                        record: Arc::new(validator.record),
                        call: validator.call,
                        reader: self.reader.clone(),
                    });
                }
                ValidatorDescriptor::Model(validator) => {
                    let name = validator.record.name().to_string();
                    if !model_names.insert(name.clone()) {
                        return Err(UsageError::DuplicateValidator {
                            model: model.to_string(),
                            validator: name,
                            kind: "model",
                        });
                    }
                    model_validators.push(ModelBinding {
                        record: Arc::new(validator.record),
                        call: validator.call,
                    });
                }
            }
        }

        trace_trace!(
            model,
            field_validators = field_validators.len(),
            model_validators = model_validators.len(),
            "validator registry built"
        );

        Ok(ValidatorRegistry {
            field_validators,
            model_validators,
        })
    }
}

impl<M: 'static> Default for RegistryBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    struct Base {
        name: String,
    }

    struct Derived {
        base: Base,
    }

    fn name_is_set<'a>(base: &'a Base, _args: FieldArgs<'a>) -> ValidatorFuture<'a> {
        async move {
            if base.name.is_empty() {
                return Err("name is empty".into());
            }
            Ok(())
        }
        .boxed()
    }

    fn always_ok<'a, M>(_model: &'a M, _args: ModelArgs<'a>) -> ValidatorFuture<'a> {
        async { Ok(()) }.boxed()
    }

    fn base_registry() -> ValidatorRegistry<Base> {
        ValidatorRegistry::builder()
            .field(FieldValidator::new("name_is_set", name_is_set).field("name"))
            .model(ModelValidator::new("base_check", always_ok::<Base>))
            .build()
            .unwrap()
    }

    #[test]
    fn own_declarations_keep_order() {
        let registry = ValidatorRegistry::<Base>::builder()
            .field(FieldValidator::new("first", name_is_set).field("name"))
            .model(ModelValidator::new("model_a", always_ok::<Base>))
            .field(FieldValidator::new("second", name_is_set).fields(["name", "alias"]))
            .model(ModelValidator::new("model_b", always_ok::<Base>).skip_on_failure(true))
            .build()
            .unwrap();

        let names: Vec<_> = registry
            .field_validators()
            .iter()
            .map(|b| b.record().name())
            .collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(registry.field_validators()[1].fields(), ["name", "alias"]);

        let names: Vec<_> = registry
            .model_validators()
            .iter()
            .map(|b| b.record().name())
            .collect();
        assert_eq!(names, ["model_a", "model_b"]);
        assert!(registry.model_validators()[1].record().skip_on_failure());
    }

    #[test]
    fn inherited_validators_come_first() {
        let base = base_registry();
        let registry = ValidatorRegistry::<Derived>::builder()
            .model(ModelValidator::new("derived_check", always_ok::<Derived>))
            .inherit(&base, |derived| &derived.base)
            .build()
            .unwrap();

        assert_eq!(registry.field_validators().len(), 1);
        let names: Vec<_> = registry
            .model_validators()
            .iter()
            .map(|b| b.record().name())
            .collect();
        assert_eq!(names, ["base_check", "derived_check"]);
    }

    #[test]
    fn inheriting_without_own_validators_mirrors_base() {
        let base = base_registry();
        let registry = ValidatorRegistry::<Derived>::builder()
            .inherit(&base, |derived| &derived.base)
            .build()
            .unwrap();

        assert_eq!(registry.field_validators().len(), base.field_validators().len());
        assert_eq!(registry.model_validators().len(), base.model_validators().len());
        assert_eq!(
            registry.field_validators()[0].record(),
            base.field_validators()[0].record()
        );
    }

    #[test]
    fn field_validator_without_fields_is_rejected() {
        let err = ValidatorRegistry::<Base>::builder()
            .field(FieldValidator::new("orphan", name_is_set))
            .build()
            .unwrap_err();
        assert!(matches!(err, UsageError::MissingFieldName { ref validator, .. } if validator == "orphan"));
        assert!(err.to_string().contains("must name at least one field"));
    }

    #[test]
    fn empty_field_name_is_rejected() {
        let err = ValidatorRegistry::<Base>::builder()
            .field(FieldValidator::new("blank", name_is_set).field(" "))
            .build()
            .unwrap_err();
        assert!(matches!(err, UsageError::EmptyFieldName { .. }));
    }

    #[test]
    fn duplicates_are_rejected_per_kind() {
        let err = ValidatorRegistry::<Base>::builder()
            .field(FieldValidator::new("check", name_is_set).field("name"))
            .field(FieldValidator::new("check", name_is_set).field("alias"))
            .build()
            .unwrap_err();
        assert!(matches!(err, UsageError::DuplicateValidator { kind: "field", .. }));

        // the same function may be both a field and a model validator
        let registry = ValidatorRegistry::<Base>::builder()
            .field(FieldValidator::new("check", name_is_set).field("name"))
            .model(ModelValidator::new("check", always_ok::<Base>))
            .build()
            .unwrap();
        assert_eq!(registry.field_validators().len(), 1);
        assert_eq!(registry.model_validators().len(), 1);
    }

    #[test]
    fn base_names_may_repeat_in_derived() {
        let base = base_registry();
        let registry = ValidatorRegistry::<Derived>::builder()
            .inherit(&base, |derived| &derived.base)
            .model(ModelValidator::new("base_check", always_ok::<Derived>))
            .build()
            .unwrap();
        assert_eq!(registry.model_validators().len(), 2);
    }

    #[test]
    fn extra_options_are_recorded() {
        let registry = ValidatorRegistry::<Base>::builder()
            .field(
                FieldValidator::new("check", name_is_set)
                    .field("name")
                    .extra("some", "thing")
                    .doc("Checks the name."),
            )
            .build()
            .unwrap();

        let record = registry.field_validators()[0].record();
        assert_eq!(record.extra()["some"], "thing");
        assert_eq!(record.doc(), Some("Checks the name."));
    }

    #[test]
    fn readers_follow_the_projection() {
        let base = ValidatorRegistry::<Base>::builder()
            .read_fields(|base: &Base, field: &str| match field {
                "name" => Some(serde_json::to_value(&base.name)),
                _ => None,
            })
            .field(FieldValidator::new("name_is_set", name_is_set).field("name"))
            .build()
            .unwrap();
        let registry = ValidatorRegistry::<Derived>::builder()
            .inherit(&base, |derived| &derived.base)
            .build()
            .unwrap();

        let derived = Derived {
            base: Base {
                name: "ada".to_string(),
            },
        };
        let binding = &registry.field_validators()[0];
        assert_eq!(binding.read(&derived, "name").unwrap().unwrap(), "ada");
        assert!(binding.read(&derived, "alias").is_none());
        assert!(base_registry().field_validators()[0]
            .read(&derived.base, "name")
            .is_none());
    }
}
