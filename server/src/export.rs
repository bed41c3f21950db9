//! CSV rendering of a collection's documents.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::model::{collection::Collection, document::Document};

/// Renders documents as RFC 4180 CSV. Columns are `id`, `created`,
/// `updated`, then the union of the collection's schema fields and every
/// key observed in the document data, sorted by name.
pub fn generate_csv(documents: &[Document], collection: &Collection) -> String {
    let mut data_columns: BTreeSet<&str> = collection
        .doc_data_schema
        .keys()
        .map(String::as_str)
        .collect();
    for document in documents {
        data_columns.extend(document.data.keys().map(String::as_str));
    }

    let mut out = String::new();
    let header: Vec<&str> = ["id", "created", "updated"]
        .into_iter()
        .chain(data_columns.iter().copied())
        .collect();
    push_row(&mut out, header.iter().map(|c| c.to_string()));

    for document in documents {
        let fixed = [
            document.id.clone(),
            document.created.to_rfc3339(),
            document.updated.to_rfc3339(),
        ];
        let data = data_columns
            .iter()
            .map(|column| match document.data.get(*column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            });
        push_row(&mut out, fixed.into_iter().chain(data));
    }

    out
}

fn push_row(out: &mut String, fields: impl Iterator<Item = String>) {
    let row: Vec<String> = fields.map(|field| escape_csv_field(&field)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
