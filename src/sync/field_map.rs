//! Remote custom field → local classification column table.

use std::collections::HashMap;

use serde::Deserialize;

use crate::integrations::asana::CustomField;
use crate::store::TaskField;

/// How one remote enum custom field lands in a local column
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldMapping {
    pub column: TaskField,
    /// Remote enum option gid → stored value
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Keyed by remote custom field gid
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FieldMappings(HashMap<String, FieldMapping>);

impl FieldMappings {
    pub fn get(&self, field_gid: &str) -> Option<&FieldMapping> {
        self.0.get(field_gid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Only classification columns may be fed from custom fields
    pub fn validate(&self) -> Result<(), String> {
        for (gid, mapping) in &self.0 {
            if !mapping.column.is_classification() {
                return Err(format!(
                    "custom field {gid} targets {}, which is not a classification column",
                    mapping.column
                ));
            }
        }
        Ok(())
    }

    /// Column and value for a remote custom field, if it is a mapped enum with a
    /// known option selected
    pub fn resolve(&self, field: &CustomField) -> Option<(TaskField, String)> {
        if !field.is_enum() {
            return None;
        }
        let mapping = self.0.get(&field.gid)?;
        let option = field.enum_value.as_ref()?;
        match mapping.options.get(&option.gid) {
            Some(value) => Some((mapping.column, value.clone())),
            None => {
                tracing::debug!(
                    field = %field.gid,
                    option = %option.gid,
                    "enum option missing from field mappings, ignored"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn mappings() -> FieldMappings {
        serde_json::from_value(json!({
            "100": {"column": "class_of_service", "options": {"101": "Expedite", "102": "Standard"}},
            "200": {"column": "task_progress", "options": {"201": "In Progress"}}
        }))
        .unwrap()
    }

    fn field(value: serde_json::Value) -> CustomField {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_resolve_mapped_enum() {
        let resolved = mappings().resolve(&field(json!({
            "gid": "100", "type": "enum", "enum_value": {"gid": "102", "name": "Standard"}
        })));
        assert_eq!(resolved, Some((TaskField::ClassOfService, "Standard".to_string())));

        // task payloads carry both keys
        let resolved = mappings().resolve(&field(json!({
            "gid": "200", "type": "enum", "resource_subtype": "enum",
            "enum_value": {"gid": "201", "name": "In Progress"}
        })));
        assert_eq!(resolved, Some((TaskField::TaskProgress, "In Progress".to_string())));
    }

    #[test]
    fn test_resolve_ignores_unmapped_and_non_enum() {
        let mappings = mappings();
        // unknown field
        assert!(mappings
            .resolve(&field(json!({"gid": "999", "type": "enum", "enum_value": {"gid": "1"}})))
            .is_none());
        // no option chosen
        assert!(mappings
            .resolve(&field(json!({"gid": "100", "type": "enum", "enum_value": null})))
            .is_none());
        // text field sharing a mapped gid
        assert!(mappings
            .resolve(&field(json!({"gid": "200", "type": "text"})))
            .is_none());
        // option absent from the table
        assert!(mappings
            .resolve(&field(json!({"gid": "200", "type": "enum", "enum_value": {"gid": "202"}})))
            .is_none());
    }

    #[test]
    fn test_validate() {
        assert!(mappings().validate().is_ok());
        let bad: FieldMappings =
            serde_json::from_value(json!({"1": {"column": "completed"}})).unwrap();
        assert!(bad.validate().is_err());
    }
}
