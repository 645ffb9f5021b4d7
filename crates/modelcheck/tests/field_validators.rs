use modelcheck::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize, ModelFields)]
struct User {
    name: String,
    nickname: Option<String>,
    age: u32,
}

#[async_validators]
impl User {
    /// Rejects reserved names.
    #[field_validator("name", "nickname")]
    async fn not_invalid(&self, value: &Value) -> Result<(), ValidatorError> {
        ensure!(value != "invalid", "Invalid name");
        Ok(())
    }

    #[field_validator("age", minimum = 18)]
    fn adult(&self, value: u32, field: &str, config: &ValidatorRecord) -> Result<(), String> {
        let minimum = config.extra()["minimum"].as_u64().unwrap_or(0);
        if u64::from(value) < minimum {
            return Err(format!("{} must be at least {}", field, minimum));
        }
        Ok(())
    }
}

fn user(name: &str, nickname: Option<&str>, age: u32) -> User {
    User {
        name: name.to_string(),
        nickname: nickname.map(str::to_string),
        age,
    }
}

#[tokio::test]
async fn valid_instance_passes() {
    assert!(user("ada", None, 36).validate_async().await.is_ok());
    assert!(user("ada", Some("countess"), 36).validate_async().await.is_ok());
}

#[tokio::test]
async fn one_failing_field_yields_one_entry() {
    let err = user("invalid", None, 36)
        .validate_async()
        .await
        .unwrap_err()
        .into_validation()
        .unwrap();

    assert_eq!(err.model(), "User");
    assert_eq!(err.len(), 1);
    let detail = &err.errors()[0];
    assert_eq!(detail.kind, "value_error");
    assert_eq!(detail.loc, vec![LocItem::from("name")]);
    assert_eq!(detail.msg, "Invalid name");
    assert_eq!(detail.input, json!("invalid"));
}

#[tokio::test]
async fn every_named_field_is_checked() {
    let err = user("invalid", Some("invalid"), 12)
        .validate_async()
        .await
        .unwrap_err()
        .into_validation()
        .unwrap();

    let locations: Vec<String> = err
        .errors()
        .iter()
        .map(|e| Location::from(e.loc.clone()).to_string())
        .collect();
    assert_eq!(locations, ["name", "nickname", "age"]);
    assert_eq!(err.errors()[2].msg, "age must be at least 18");
    assert_eq!(err.errors()[2].input, json!(12));
}

#[test]
fn declarations_are_recorded() {
    let registry = User::registry();
    assert_eq!(registry.field_validators().len(), 2);
    assert!(registry.model_validators().is_empty());

    let first = &registry.field_validators()[0];
    assert_eq!(first.fields(), ["name", "nickname"]);
    assert_eq!(first.record().name(), "not_invalid");
    assert_eq!(first.record().doc(), Some("Rejects reserved names."));

    let second = &registry.field_validators()[1];
    assert_eq!(second.record().extra()["minimum"], json!(18));
}

#[derive(Serialize, ModelFields)]
struct Profile {
    handle: String,
    score: i64,
}

#[async_validators]
impl Profile {
    #[field_validator("handle")]
    async fn numeric_handle(&self, _value: u32) -> Result<(), ValidatorError> {
        Ok(())
    }

    #[field_validator("score", "missing")]
    async fn inspect(&self, args: FieldArgs<'_>) -> Result<(), ValidatorError> {
        if args.field() == "missing" {
            ensure!(!args.value().is_null(), "{} is absent", args.field());
        }
        Ok(())
    }
}

#[tokio::test]
async fn wrong_value_type_is_a_validation_failure() {
    let profile = Profile {
        handle: "not-a-number".to_string(),
        score: 3,
    };
    let err = profile
        .validate_async()
        .await
        .unwrap_err()
        .into_validation()
        .unwrap();

    assert_eq!(err.len(), 2);
    assert_eq!(err.errors()[0].loc, vec![LocItem::from("handle")]);
    assert!(err.errors()[0].msg.starts_with("field `handle` has an unexpected type"));
    assert_eq!(err.errors()[1].msg, "missing is absent");
    assert_eq!(err.errors()[1].input, Value::Null);
}

#[derive(Serialize, ModelFields)]
#[serde(rename_all = "camelCase")]
struct Signup {
    user_name: String,
    #[serde(rename = "mail")]
    email_address: String,
    #[serde(skip)]
    invite_code: Option<String>,
}

#[async_validators]
impl Signup {
    #[field_validator("user_name")]
    async fn not_taken(&self, value: &str) -> Result<(), ValidatorError> {
        ensure!(value != "taken", "user name `{}` is taken", value);
        Ok(())
    }

    #[field_validator("email_address", "invite_code")]
    async fn present(&self, value: Option<String>, field: &str) -> Result<(), ValidatorError> {
        ensure!(value.is_some(), "{} is required", field);
        Ok(())
    }

    #[field_validator("userName")]
    async fn serialized_name(&self, value: &str) -> Result<(), ValidatorError> {
        ensure!(value == self.user_name);
        Ok(())
    }
}

fn signup(user_name: &str, invite_code: Option<&str>) -> Signup {
    Signup {
        user_name: user_name.to_string(),
        email_address: "ada@example.com".to_string(),
        invite_code: invite_code.map(str::to_string),
    }
}

#[tokio::test]
async fn renamed_and_skipped_fields_are_read_by_rust_name() {
    assert!(signup("ada", Some("welcome")).validate_async().await.is_ok());

    let err = signup("taken", None)
        .validate_async()
        .await
        .unwrap_err()
        .into_validation()
        .unwrap();
    assert_eq!(err.len(), 2);
    assert_eq!(err.errors()[0].loc, vec![LocItem::from("user_name")]);
    assert_eq!(err.errors()[0].input, json!("taken"));
    assert_eq!(err.errors()[1].loc, vec![LocItem::from("invite_code")]);
    assert_eq!(err.errors()[1].msg, "invite_code is required");
}

#[test]
fn derived_field_access() {
    let signup = signup("ada", None);
    assert_eq!(signup.field_value("user_name").unwrap().unwrap(), json!("ada"));
    assert_eq!(signup.field_value("invite_code").unwrap().unwrap(), Value::Null);
    assert!(signup.field_value("userName").is_none());
    assert!(signup.field_value("unknown").is_none());
}
