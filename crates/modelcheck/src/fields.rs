//! Field access by Rust field name.
//!
//! Field validators are scoped to field names as written in the struct
//! definition. `#[derive(ModelFields)]` reads those fields directly, so serde
//! attributes such as `rename`, `rename_all` or `skip` do not change what a
//! validator sees. Names the type does not know fall back to the serialized
//! snapshot, where absent fields read as `null`.

use serde::Serialize;
use serde_json::Value;

/// Result of reading one field: `None` when the field is unknown or not
/// serializable.
pub type FieldValue = Option<Result<Value, serde_json::Error>>;

/// Read access to a model's fields by their Rust name.
///
/// Usually derived:
///
/// ```rust,ignore
/// #[derive(Serialize, ModelFields)]
/// #[serde(rename_all = "camelCase")]
/// struct Signup {
///     user_name: String,
/// }
///
/// assert_eq!(signup.field_value("user_name").unwrap()?, json!("ada"));
/// ```
///
/// Tuple struct fields are named by their index (`"0"`, `"1"`, ...).
pub trait ModelFields {
    /// Current value of the field `name`, serialized to JSON.
    fn field_value(&self, name: &str) -> FieldValue;
}

/// Borrowed field used by derived [`ModelFields`] impls.
///
/// Serializable fields are read, others report `None`.
#[doc(hidden)]
pub struct FieldRef<'a, T: ?Sized>(pub &'a T);

#[doc(hidden)]
pub trait ReadSerialized {
    fn read_value(&self) -> FieldValue;
}

impl<T: Serialize + ?Sized> ReadSerialized for FieldRef<'_, T> {
    fn read_value(&self) -> FieldValue {
        Some(serde_json::to_value(self.0))
    }
}

#[doc(hidden)]
pub trait ReadOpaque {
    fn read_value(&self) -> FieldValue {
        None
    }
}

impl<T: ?Sized> ReadOpaque for &FieldRef<'_, T> {}
