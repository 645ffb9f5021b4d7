//! # modelcheck
//!
//! Async validation for models that already passed structural validation:
//! uniqueness checks against a database, lookups in remote services, anything
//! that has to await.
//!
//! Validators are declared on an inherent `impl` block. Field validators run
//! once per named field, model validators once per instance. Fields are named
//! as in the struct definition and read through `#[derive(ModelFields)]`.
//! Every failure is collected, nested models are validated too, and the run
//! ends with one [`AsyncValidationError`] listing each failure with its
//! location.
//!
//! ## Example
//!
//! ```rust,ignore
//! use modelcheck::prelude::*;
//! use serde::Serialize;
//!
//! #[derive(Serialize, ModelFields)]
//! struct User {
//!     name: String,
//!     email: String,
//! }
//!
//! #[async_validators]
//! impl User {
//!     #[field_validator("name")]
//!     async fn name_is_free(&self, value: &str) -> Result<(), ValidatorError> {
//!         ensure!(value != "admin", "name `{}` is reserved", value);
//!         Ok(())
//!     }
//!
//!     #[model_validator(skip_on_failure)]
//!     async fn email_matches_name(&self) -> Result<(), ValidatorError> {
//!         ensure!(self.email.starts_with(&self.name));
//!         Ok(())
//!     }
//! }
//!
//! let user = User { name: "admin".into(), email: "root@example.com".into() };
//! let err = user.validate_async().await.unwrap_err();
//! ```
//!
//! ## Error Format
//!
//! ```json
//! [
//!   {"type": "value_error", "loc": ["name"], "msg": "name `admin` is reserved", "input": "admin"}
//! ]
//! ```
//!
//! Model validators report at `["__root__"]`, nested models prefix their
//! attribute name (and index or key) to the location.
//!
//! ## Features
//!
//! - `tracing` (default): debug and trace events for every run
//! - `http` (default): the [`http`](crate::http) request boundary producing `422` responses

#[macro_use]
mod tracing_macros;

pub mod adapter;
mod engine;
mod error;
mod fields;
mod record;
mod registry;
pub mod schema;
mod signature;

#[cfg(feature = "http")]
pub mod http;

extern crate self as modelcheck;

pub use adapter::{prefix_errors, ValidationFailure};
pub use engine::{short_type_name, validate_full, AsyncModel, AsyncValidate, Children, Nested};
pub use error::{
    AsyncValidationError, BoxError, Error, ErrorDetail, LocItem, Location, UsageError,
    ValidatorError, ROOT_LOCATION, VALUE_ERROR,
};
pub use fields::{FieldValue, ModelFields};
pub use record::{Extra, ValidatorRecord};
pub use registry::{
    FieldBinding, FieldReader, FieldValidator, ModelBinding, ModelValidator, RegistryBuilder,
    ValidatorDescriptor, ValidatorRegistry,
};
pub use signature::{FieldArgs, FieldCall, ModelArgs, ModelCall, ValidatorFuture};

#[doc(hidden)]
pub use engine::VisitScope;

/// Declare async validators on an inherent `impl` block.
pub use modelcheck_macros::async_validators;

/// Derive [`ModelFields`] for a struct.
pub use modelcheck_macros::ModelFields;

/// Reject the validated value unless `cond` holds.
///
/// Without a message the stringified condition is reported.
///
/// ```rust,ignore
/// ensure!(value.len() >= 3);
/// ensure!(value != "admin", "name `{}` is reserved", value);
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr $(,)?) => {
        if !$cond {
            return ::core::result::Result::Err($crate::ValidatorError::invalid(concat!(
                "assertion failed: ",
                stringify!($cond)
            )));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return ::core::result::Result::Err($crate::ValidatorError::invalid(format!($($arg)+)));
        }
    };
}

#[doc(hidden)]
pub mod __private {
    pub use crate::fields::{FieldRef, ReadOpaque, ReadSerialized};
    pub use serde_json;
}

/// Prelude module for async validation
pub mod prelude {
    pub use crate::ensure;
    pub use crate::{
        async_validators, AsyncModel, AsyncValidate, AsyncValidationError, Children, Error,
        ErrorDetail, FieldArgs, FieldValidator, LocItem, Location, ModelArgs, ModelFields,
        ModelValidator, Nested, ValidatorError, ValidatorFuture, ValidatorRecord, ValidatorRegistry,
    };
    pub use std::sync::OnceLock;

    #[cfg(feature = "http")]
    pub use crate::http::{ensure_request_validation_errors, Rejection, RequestValidationError};
}
