use modelcheck::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize, ModelFields)]
struct Item {
    name: String,
}

#[async_validators]
impl Item {
    #[field_validator("name")]
    async fn name_valid(&self, value: &str) -> Result<(), ValidatorError> {
        ensure!(value != "invalid", "Invalid name");
        Ok(())
    }

    #[model_validator]
    async fn item_valid(&self) -> Result<(), ValidatorError> {
        ensure!(self.name != "invalid", "Invalid item");
        Ok(())
    }
}

#[derive(Serialize, ModelFields)]
struct Order {
    reference: String,
    direct: Item,
    items: Vec<Item>,
    by_key: BTreeMap<String, Item>,
    gift: Option<Box<Item>>,
}

#[async_validators(nested(direct, items, by_key, gift))]
impl Order {
    #[field_validator("reference")]
    async fn reference_set(&self, value: &str) -> Result<(), ValidatorError> {
        ensure!(!value.is_empty(), "reference is required");
        Ok(())
    }
}

#[derive(Serialize, ModelFields)]
struct Shipment {
    order: Order,
}

#[async_validators(nested(order))]
impl Shipment {}

fn item(name: &str) -> Item {
    Item {
        name: name.to_string(),
    }
}

fn order(invalid: bool) -> Order {
    let name = if invalid { "invalid" } else { "ok" };
    Order {
        reference: "A-1".to_string(),
        direct: item(name),
        items: vec![item(name), item("ok")],
        by_key: BTreeMap::from([("k".to_string(), item(name))]),
        gift: None,
    }
}

fn locations(err: &AsyncValidationError) -> Vec<String> {
    err.errors()
        .iter()
        .map(|e| Location::from(e.loc.clone()).to_string())
        .collect()
}

#[tokio::test]
async fn valid_graph_passes() {
    assert!(order(false).validate_async().await.is_ok());
    assert!(Shipment { order: order(false) }.validate_async().await.is_ok());
}

#[tokio::test]
async fn nested_errors_carry_their_path() {
    let err = order(true)
        .validate_async()
        .await
        .unwrap_err()
        .into_validation()
        .unwrap();

    assert_eq!(err.model(), "Order");
    assert_eq!(
        locations(&err),
        [
            "direct.name",
            "direct.__root__",
            "items.0.name",
            "items.0.__root__",
            "by_key.k.name",
            "by_key.k.__root__",
        ]
    );
    assert_eq!(err.errors()[2].loc[1], LocItem::Index(0));
    assert_eq!(err.errors()[2].input, "invalid");
}

#[tokio::test]
async fn own_errors_precede_nested_errors() {
    let mut order = order(true);
    order.reference.clear();
    order.gift = Some(Box::new(item("invalid")));

    let err = order
        .validate_async()
        .await
        .unwrap_err()
        .into_validation()
        .unwrap();
    let locations = locations(&err);
    assert_eq!(locations.first().map(String::as_str), Some("reference"));
    assert_eq!(
        &locations[locations.len() - 2..],
        ["gift.name", "gift.__root__"]
    );
}

#[tokio::test]
async fn deep_nesting_prefixes_every_level() {
    let err = Shipment { order: order(true) }
        .validate_async()
        .await
        .unwrap_err()
        .into_validation()
        .unwrap();

    assert_eq!(err.model(), "Shipment");
    assert_eq!(err.len(), 6);
    assert_eq!(
        err.errors()[3].loc,
        vec![
            LocItem::from("order"),
            LocItem::from("items"),
            LocItem::Index(0),
            LocItem::root(),
        ]
    );
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let shipment = Shipment { order: order(true) };
    let first = shipment.validate_async().await.unwrap_err().into_validation().unwrap();
    let second = shipment.validate_async().await.unwrap_err().into_validation().unwrap();
    assert_eq!(first, second);
}

#[test]
fn children_are_collected_in_declaration_order() {
    let order = order(false);
    let children = order.children();
    let paths: Vec<String> = children.paths().iter().map(|p| p.to_string()).collect();
    assert_eq!(paths, ["direct", "items.0", "items.1", "by_key.k"]);
}
