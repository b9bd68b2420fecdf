use serde_json::Value;

use crate::entity::Entity;

/// Render a list of records as CSV.
///
/// The first row holds the column paths; each following row holds one
/// record's values. `id` always resolves to the record id, and nested paths
/// such as `branch.branchName` are followed. Values containing commas,
/// quotes or newlines are quoted with inner quotes doubled.
///
/// # Arguments
/// * `entities` - Records to export, usually a derived view
/// * `columns` - Field paths to export, in order
///
/// # Returns
/// * `String` - CSV content
///
/// # Examples
/// ```
/// use brewdesk::entity::Entity;
/// use brewdesk::export::to_csv;
///
/// let entity = Entity::new(3, serde_json::Map::new());
/// assert_eq!(to_csv(&[&entity], &["id"]), "id\n3\n");
/// ```
pub fn to_csv<S: AsRef<str>>(entities: &[&Entity], columns: &[S]) -> String {
    let mut csv_content = String::new();

    // Header row with column paths
    let header: Vec<String> = columns.iter().map(|c| escape(c.as_ref())).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for entity in entities {
        let row: Vec<String> = columns
            .iter()
            .map(|column| escape(&cell_text(entity, column.as_ref())))
            .collect();
        csv_content.push_str(&row.join(","));
        csv_content.push('\n');
    }

    csv_content
}

/// Plain-text rendering of one field, as shown in a table cell.
pub fn cell_text(entity: &Entity, column: &str) -> String {
    if column == "id" {
        return entity.id().to_string();
    }
    match entity.resolve(column).as_deref() {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
