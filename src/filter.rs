use std::collections::BTreeMap;

use serde_json::Value;

use crate::entity::Entity;

/// Sentinel value meaning "do not filter on this field".
pub const ALL: &str = "all";

/// One categorical predicate of a list page.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldFilter {
    #[default]
    All,
    Equals(Value),
}

impl FieldFilter {
    /// Parse a filter value as typed into a filter control.
    ///
    /// `"all"` disables the filter; JSON literals (`3`, `true`, `null`) are
    /// compared as such; anything else is compared as a string.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case(ALL) {
            return FieldFilter::All;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => {
                FieldFilter::Equals(value)
            }
            _ => FieldFilter::Equals(Value::String(raw.to_string())),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FieldFilter::All)
    }

    fn accepts(&self, entity: &Entity, path: &str) -> bool {
        match self {
            FieldFilter::All => true,
            FieldFilter::Equals(expected) => entity
                .resolve(path)
                .is_some_and(|actual| *actual == *expected),
        }
    }
}

/// What the user currently has typed into the search box and filter
/// dropdowns of a list page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewFilters {
    /// Case-insensitive substring searched for
    pub search_text: String,

    /// Paths searched by `search_text`; empty means every string field
    pub search_fields: Vec<String>,

    /// Equality predicates keyed by field path
    pub field_filters: BTreeMap<String, FieldFilter>,
}

impl ViewFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn searching<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search_text = text.into();
        self
    }

    pub fn with_filter(mut self, path: impl Into<String>, filter: FieldFilter) -> Self {
        self.field_filters.insert(path.into(), filter);
        self
    }

    /// True when the filters let every record through.
    pub fn is_identity(&self) -> bool {
        self.search_text.is_empty() && self.field_filters.values().all(FieldFilter::is_all)
    }

    /// Whether a single record belongs in the derived view.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.matches_search(entity)
            && self
                .field_filters
                .iter()
                .all(|(path, filter)| filter.accepts(entity, path))
    }

    fn matches_search(&self, entity: &Entity) -> bool {
        if self.search_text.is_empty() {
            return true;
        }
        let needle = self.search_text.to_lowercase();
        let contains = |s: &str| s.to_lowercase().contains(&needle);

        if self.search_fields.is_empty() {
            entity.string_values().into_iter().any(contains)
        } else {
            self.search_fields
                .iter()
                .filter_map(|path| entity.field(path).and_then(Value::as_str))
                .any(contains)
        }
    }
}

/// Derive what a list page shows from its raw collection.
///
/// Applies the search predicate, then every field predicate, and keeps the
/// source order. The result borrows from `raw`, so it can only ever be a
/// subsequence of it. Pure: identical inputs give identical output.
///
/// # Arguments
/// * `raw` - The collection last fetched from the backend
/// * `filters` - Current search text and field filters
///
/// # Returns
/// * `Vec<&Entity>` - The records to display, in source order
pub fn derive_view<'a>(raw: &'a [Entity], filters: &ViewFilters) -> Vec<&'a Entity> {
    raw.iter().filter(|entity| filters.matches(entity)).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn accounts() -> Vec<Entity> {
        [
            json!({ "id": 1, "firstName": "Ana", "lastName": "Reyes", "role": "Admin",
                    "status": "Approved", "branch": { "branchName": "Downtown" } }),
            json!({ "id": 2, "firstName": "Ben", "lastName": "Cruz", "role": "Cashier",
                    "status": "Pending", "branch": { "branchName": "Harbor" } }),
            json!({ "id": 3, "firstName": "Cora", "lastName": "Benitez", "role": "Staff",
                    "status": "Approved", "branch": { "branchName": "Downtown" } }),
        ]
        .into_iter()
        .map(|v| Entity::from_value(v, "id").unwrap())
        .collect()
    }

    fn ids(view: &[&Entity]) -> Vec<i64> {
        view.iter().map(|e| e.id()).collect()
    }

    #[test]
    fn role_filter_selects_single_cashier() {
        let raw = accounts();
        let filters = ViewFilters::new().with_filter("role", FieldFilter::parse("Cashier"));
        assert_eq!(ids(&derive_view(&raw, &filters)), vec![2]);
    }

    #[test]
    fn no_active_filters_is_identity() {
        let raw = accounts();
        let filters = ViewFilters::new()
            .with_filter("role", FieldFilter::parse("all"))
            .with_filter("status", FieldFilter::All);
        assert!(filters.is_identity());
        assert_eq!(ids(&derive_view(&raw, &filters)), vec![1, 2, 3]);
    }

    #[test]
    fn search_is_case_insensitive_over_chosen_fields() {
        let raw = accounts();
        let filters = ViewFilters::new()
            .searching(["firstName", "lastName"])
            .with_search("BEN");
        assert_eq!(ids(&derive_view(&raw, &filters)), vec![2, 3]);

        let filters = ViewFilters::new().searching(["firstName"]).with_search("downtown");
        assert!(derive_view(&raw, &filters).is_empty());
    }

    #[test]
    fn search_without_fields_covers_nested_strings() {
        let raw = accounts();
        let filters = ViewFilters::new().with_search("harb");
        assert_eq!(ids(&derive_view(&raw, &filters)), vec![2]);
    }

    #[test]
    fn filters_are_conjunctive_and_reach_nested_fields() {
        let raw = accounts();
        let filters = ViewFilters::new()
            .with_filter("branch.branchName", FieldFilter::parse("Downtown"))
            .with_filter("status", FieldFilter::parse("Approved"))
            .with_search("cora");
        assert_eq!(ids(&derive_view(&raw, &filters)), vec![3]);
    }

    #[test]
    fn equality_is_exact() {
        let raw = accounts();
        let filters = ViewFilters::new().with_filter("role", FieldFilter::parse("cashier"));
        assert!(derive_view(&raw, &filters).is_empty());

        let filters = ViewFilters::new().with_filter("missing", FieldFilter::parse("x"));
        assert!(derive_view(&raw, &filters).is_empty());
    }

    #[test]
    fn stock_level_filter_uses_virtual_bucket() {
        let raw: Vec<Entity> = [
            json!({ "id": 1, "itemName": "Milk", "quantity": 0 }),
            json!({ "id": 2, "itemName": "Beans", "quantity": 4 }),
            json!({ "id": 3, "itemName": "Cups", "quantity": 200 }),
        ]
        .into_iter()
        .map(|v| Entity::from_value(v, "id").unwrap())
        .collect();

        let filters = ViewFilters::new().with_filter("stockLevel", FieldFilter::parse("Low Stock"));
        assert_eq!(ids(&derive_view(&raw, &filters)), vec![2]);
    }

    #[test]
    fn parse_recognizes_literals() {
        assert_eq!(FieldFilter::parse("ALL"), FieldFilter::All);
        assert_eq!(FieldFilter::parse("3"), FieldFilter::Equals(json!(3)));
        assert_eq!(FieldFilter::parse("true"), FieldFilter::Equals(json!(true)));
        assert_eq!(FieldFilter::parse("Pending"), FieldFilter::Equals(json!("Pending")));
        assert_eq!(FieldFilter::parse("\"3\""), FieldFilter::Equals(json!("\"3\"")));
    }
}
