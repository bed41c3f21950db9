//! Translation between the flat field lists users edit, the stored
//! per-collection document schema, and the combined schema handed to the
//! structured-generation call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::Display;

use crate::model::collection::Collection;

pub const EMAILS_COLLECTION: &str = "emails";

/// Closed set of field type tags a collection schema may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Email,
    Url,
}

/// One entry of the flat field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: false,
            description: Some(description.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    #[serde(rename = "date-time")]
    DateTime,
    Email,
    Uri,
}

/// One field of a collection's stored `docDataSchema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredField {
    #[serde(rename = "type")]
    pub json_type: JsonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub type StoredSchema = BTreeMap<String, StoredField>;

/// Flat field list -> stored schema. `date`, `email` and `url` store as JSON
/// strings with a format discriminator; `required` is not persisted.
pub fn fields_to_schema(fields: &[FieldSpec]) -> StoredSchema {
    fields
        .iter()
        .map(|field| {
            let (json_type, format) = match field.field_type {
                FieldType::String => (JsonType::String, None),
                FieldType::Number => (JsonType::Number, None),
                FieldType::Boolean => (JsonType::Boolean, None),
                FieldType::Date => (JsonType::String, Some(FieldFormat::DateTime)),
                FieldType::Email => (JsonType::String, Some(FieldFormat::Email)),
                FieldType::Url => (JsonType::String, Some(FieldFormat::Uri)),
            };
            (
                field.name.clone(),
                StoredField {
                    json_type,
                    format,
                    description: field.description.clone(),
                },
            )
        })
        .collect()
}

/// Flat type tag a stored field re-derives to; the format discriminator
/// disambiguates the string-backed types.
pub fn stored_field_type(stored: &StoredField) -> FieldType {
    match (stored.json_type, stored.format) {
        (JsonType::Number, _) => FieldType::Number,
        (JsonType::Boolean, _) => FieldType::Boolean,
        (_, Some(FieldFormat::DateTime)) => FieldType::Date,
        (_, Some(FieldFormat::Email)) => FieldType::Email,
        (_, Some(FieldFormat::Uri)) => FieldType::Url,
        (JsonType::String, None) => FieldType::String,
    }
}

/// Stored schema -> flat field list. `required` always reconstructs as false.
pub fn schema_to_fields(schema: &StoredSchema) -> Vec<FieldSpec> {
    schema
        .iter()
        .map(|(name, stored)| FieldSpec {
            name: name.clone(),
            field_type: stored_field_type(stored),
            required: false,
            description: stored.description.clone(),
        })
        .collect()
}

/// Collections eligible for extraction: everything except `emails` and
/// collections without a usable schema.
pub fn eligible_collections(collections: &[Collection]) -> Vec<&Collection> {
    collections
        .iter()
        .filter(|c| !c.is_emails() && c.has_schema())
        .collect()
}

fn extraction_field_type(stored: &StoredField) -> &'static str {
    match stored.json_type {
        JsonType::Number => "number",
        JsonType::Boolean => "boolean",
        JsonType::String => "string",
    }
}

/// Combined schema constraining the structured-generation call: each eligible
/// collection name maps to an optional array of records whose fields are all
/// optional. Returns `None` when no collection qualifies, in which case
/// extraction must be skipped entirely.
pub fn extraction_schema(collections: &[&Collection]) -> Option<Value> {
    let mut properties = serde_json::Map::new();
    for collection in collections {
        if collection.is_emails() || !collection.has_schema() {
            continue;
        }
        let mut field_props = serde_json::Map::new();
        for (name, stored) in &collection.doc_data_schema {
            field_props.insert(
                name.clone(),
                json!({ "type": extraction_field_type(stored) }),
            );
        }
        properties.insert(
            collection.name.clone(),
            json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": field_props,
                    "additionalProperties": false
                }
            }),
        );
    }

    if properties.is_empty() {
        return None;
    }

    Some(json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::collection_fixture;

    fn all_types() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("title", FieldType::String, "Title"),
            FieldSpec::new("count", FieldType::Number, "Count"),
            FieldSpec::new("done", FieldType::Boolean, "Done"),
            FieldSpec::new("when", FieldType::Date, "When"),
            FieldSpec::new("contact", FieldType::Email, "Contact"),
            FieldSpec::new("link", FieldType::Url, "Link"),
        ]
    }

    #[test]
    fn test_fields_to_schema_formats() {
        let schema = fields_to_schema(&all_types());

        assert_eq!(schema["title"].json_type, JsonType::String);
        assert_eq!(schema["title"].format, None);
        assert_eq!(schema["count"].json_type, JsonType::Number);
        assert_eq!(schema["done"].json_type, JsonType::Boolean);
        assert_eq!(schema["when"].json_type, JsonType::String);
        assert_eq!(schema["when"].format, Some(FieldFormat::DateTime));
        assert_eq!(schema["contact"].format, Some(FieldFormat::Email));
        assert_eq!(schema["link"].format, Some(FieldFormat::Uri));
    }

    #[test]
    fn test_round_trip_loses_only_required() {
        let mut fields = all_types();
        fields[0].required = true;

        let schema = fields_to_schema(&fields);
        let mut restored = schema_to_fields(&schema);
        restored.sort_by(|a, b| {
            let pos = |f: &FieldSpec| fields.iter().position(|o| o.name == f.name).unwrap();
            pos(a).cmp(&pos(b))
        });

        for (original, round_tripped) in fields.iter().zip(&restored) {
            assert_eq!(original.name, round_tripped.name);
            assert_eq!(original.field_type, round_tripped.field_type);
            assert_eq!(original.description, round_tripped.description);
            assert!(!round_tripped.required);
        }
    }

    #[test]
    fn test_stored_schema_serialization_shape() {
        let schema = fields_to_schema(&[FieldSpec::new("link", FieldType::Url, "A link")]);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "link": {"type": "string", "format": "uri", "description": "A link"}
            })
        );
    }

    #[test]
    fn test_extraction_schema_excludes_emails() {
        let news = collection_fixture(
            "news",
            &[FieldSpec::new("title", FieldType::String, "News title")],
        );
        let emails = collection_fixture(
            EMAILS_COLLECTION,
            &[FieldSpec::new("messageId", FieldType::String, "Message id")],
        );
        let collections = vec![news, emails];

        let eligible = eligible_collections(&collections);
        assert_eq!(eligible.len(), 1);

        let schema = extraction_schema(&eligible).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(
            properties["news"]["items"]["properties"]["title"]["type"],
            "string"
        );
        // all fields optional: no required arrays anywhere
        assert!(schema.get("required").is_none());
        assert!(properties["news"]["items"].get("required").is_none());
    }

    #[test]
    fn test_extraction_schema_empty_when_nothing_qualifies() {
        let empty = collection_fixture("notes", &[]);
        let collections = vec![empty];
        let eligible = eligible_collections(&collections);
        assert!(eligible.is_empty());
        assert!(extraction_schema(&eligible).is_none());
    }

    #[test]
    fn test_extraction_schema_type_mapping() {
        let tasks = collection_fixture(
            "tasks",
            &[
                FieldSpec::new("title", FieldType::String, "Title"),
                FieldSpec::new("hours", FieldType::Number, "Hours"),
                FieldSpec::new("done", FieldType::Boolean, "Done"),
                FieldSpec::new("due", FieldType::Date, "Due"),
            ],
        );
        let collections = vec![tasks];
        let schema = extraction_schema(&eligible_collections(&collections)).unwrap();
        let props = &schema["properties"]["tasks"]["items"]["properties"];
        assert_eq!(props["title"]["type"], "string");
        assert_eq!(props["hours"]["type"], "number");
        assert_eq!(props["done"]["type"], "boolean");
        assert_eq!(props["due"]["type"], "string");
    }
}
