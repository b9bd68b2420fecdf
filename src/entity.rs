use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::ApiError;

/// Virtual field resolved from `quantity` and `reorderLevel`.
pub const STOCK_LEVEL_FIELD: &str = "stockLevel";

pub const DEFAULT_REORDER_LEVEL: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockLevel {
    OutOfStock,
    Low,
    InStock,
}

impl StockLevel {
    pub fn bucket(quantity: i64, reorder_level: i64) -> Self {
        if quantity <= 0 {
            StockLevel::OutOfStock
        } else if quantity <= reorder_level {
            StockLevel::Low
        } else {
            StockLevel::InStock
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StockLevel::OutOfStock => "Out of Stock",
            StockLevel::Low => "Low Stock",
            StockLevel::InStock => "In Stock",
        }
    }
}

/// A backend record: an immutable integer id plus named JSON fields.
///
/// The id is kept apart from `fields` so nothing that patches fields can
/// change it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: i64,
    pub fields: Map<String, Value>,
}

impl Entity {
    pub fn new(id: i64, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Build an entity from a JSON record whose id lives under `id_field`.
    pub fn from_value(value: Value, id_field: &str) -> Result<Self, ApiError> {
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(ApiError::InvalidResponse(format!(
                    "expected a record, found {other}"
                )));
            }
        };

        let id = fields
            .remove(id_field)
            .as_ref()
            .and_then(integer_value)
            .ok_or_else(|| {
                ApiError::InvalidResponse(format!("record without an integer `{id_field}`"))
            })?;

        Ok(Self { id, fields })
    }

    /// The record as JSON, with the id restored under `id_field`.
    pub fn to_value(&self, id_field: &str) -> Value {
        let mut map = self.fields.clone();
        map.insert(id_field.to_string(), Value::from(self.id));
        Value::Object(map)
    }

    /// Look up a dot-delimited path such as `branch.branchName`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Like [`Entity::field`], but also answers the virtual
    /// [`STOCK_LEVEL_FIELD`] when the record does not carry one itself.
    pub fn resolve(&self, path: &str) -> Option<Cow<'_, Value>> {
        if let Some(value) = self.field(path) {
            return Some(Cow::Borrowed(value));
        }
        if path == STOCK_LEVEL_FIELD {
            return self
                .stock_level()
                .map(|level| Cow::Owned(Value::from(level.label())));
        }
        None
    }

    pub fn stock_level(&self) -> Option<StockLevel> {
        let quantity = self.field("quantity").and_then(integer_value)?;
        let reorder_level = self
            .field("reorderLevel")
            .and_then(integer_value)
            .unwrap_or(DEFAULT_REORDER_LEVEL);
        Some(StockLevel::bucket(quantity, reorder_level))
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Overlay `patch` onto the record. A key equal to `id_field` is ignored.
    pub fn merge(&mut self, patch: &Map<String, Value>, id_field: &str) {
        for (key, value) in patch {
            if key != id_field {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    /// Every string leaf in the record, nested records included.
    pub fn string_values(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            collect_strings(value, &mut out);
        }
        out
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Integer from a JSON number or a numeric string.
pub(crate) fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn account() -> Entity {
        Entity::from_value(
            json!({
                "id": 7,
                "username": "jdoe",
                "role": "Cashier",
                "branch": { "branchId": 2, "branchName": "Downtown" },
                "tags": ["night", { "shift": "closing" }]
            }),
            "id",
        )
        .unwrap()
    }

    #[test]
    fn id_is_split_from_fields() {
        let entity = account();
        assert_eq!(entity.id(), 7);
        assert!(!entity.fields.contains_key("id"));
        assert_eq!(entity.to_value("id")["id"], json!(7));
    }

    #[test]
    fn custom_and_string_ids() {
        let entity = Entity::from_value(json!({ "branchId": "12", "branchName": "Uptown" }), "branchId").unwrap();
        assert_eq!(entity.id(), 12);

        let err = Entity::from_value(json!({ "name": "no id" }), "id").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));

        let err = Entity::from_value(json!("plain"), "id").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[test]
    fn nested_paths_resolve() {
        let entity = account();
        assert_eq!(entity.field("branch.branchName"), Some(&json!("Downtown")));
        assert_eq!(entity.field("branch.missing"), None);
        assert_eq!(entity.field("role.name"), None);
    }

    #[test]
    fn merge_never_touches_id() {
        let mut entity = account();
        let patch = json!({ "id": 99, "role": "Staff" });
        entity.merge(patch.as_object().unwrap(), "id");
        assert_eq!(entity.id(), 7);
        assert_eq!(entity.field("role"), Some(&json!("Staff")));
    }

    #[test]
    fn string_values_walk_nested_records() {
        let entity = account();
        let mut values = entity.string_values();
        values.sort_unstable();
        assert_eq!(values, vec!["Cashier", "Downtown", "closing", "jdoe", "night"]);
    }

    #[test]
    fn stock_level_buckets() {
        let item = |quantity: i64, reorder: Option<i64>| {
            let mut fields = Map::new();
            fields.insert("quantity".into(), json!(quantity));
            if let Some(r) = reorder {
                fields.insert("reorderLevel".into(), json!(r));
            }
            Entity::new(1, fields)
        };

        assert_eq!(item(0, None).stock_level(), Some(StockLevel::OutOfStock));
        assert_eq!(item(10, None).stock_level(), Some(StockLevel::Low));
        assert_eq!(item(11, None).stock_level(), Some(StockLevel::InStock));
        assert_eq!(item(11, Some(20)).stock_level(), Some(StockLevel::Low));
        assert_eq!(
            item(3, None).resolve(STOCK_LEVEL_FIELD).as_deref(),
            Some(&json!("Low Stock"))
        );
        assert_eq!(account().resolve(STOCK_LEVEL_FIELD), None);
    }
}
