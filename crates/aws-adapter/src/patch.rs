//! JSON-Patch diffing and read-only/create-only property filtering (spec
//! §4.4), and the pure create-vs-update decision function.

use crate::schema::TypeSchema;
use json_patch::{Patch, PatchOperation};
use ucp_errors::UcpError;

fn operation_path(op: &PatchOperation) -> &str {
    match op {
        PatchOperation::Add(o) => o.path.as_str(),
        PatchOperation::Remove(o) => o.path.as_str(),
        PatchOperation::Replace(o) => o.path.as_str(),
        PatchOperation::Move(o) => o.path.as_str(),
        PatchOperation::Copy(o) => o.path.as_str(),
        PatchOperation::Test(o) => o.path.as_str(),
    }
}

fn matches_property(path: &str, property: &str) -> bool {
    let target = format!("/{property}");
    path == target || path.starts_with(&format!("{target}/"))
}

/// Computes `current -> desired` as a JSON-Patch document, then drops any
/// operation touching a read-only property (the back-end owns it and it can
/// never legitimately diverge from what the back-end reports) or a
/// create-only property (changing it requires replace, out of scope here and
/// rejected upstream as `InvalidRequest` by callers that care).
pub fn compute_patch(
    current: &serde_json::Value,
    desired: &serde_json::Value,
    schema: &TypeSchema,
) -> Patch {
    let raw = json_patch::diff(current, desired);
    let filtered: Vec<PatchOperation> = raw
        .0
        .into_iter()
        .filter(|op| {
            let path = operation_path(op);
            !schema
                .read_only_properties
                .iter()
                .any(|p| matches_property(path, p))
                && !schema
                    .create_only_properties
                    .iter()
                    .any(|p| matches_property(path, p))
        })
        .collect();
    Patch(filtered)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOrUpdateDecision {
    /// `GetResource` missed: issue `CreateResource`.
    Create,
    /// `GetResource` hit and the filtered patch is non-empty: issue
    /// `UpdateResource`.
    Update,
    /// `GetResource` hit and the filtered patch is empty: no call at all,
    /// echo `current` with `200` (spec §8 invariant 5).
    NoOpEcho,
}

pub fn decide(current: Option<&serde_json::Value>, desired: &serde_json::Value, schema: &TypeSchema) -> CreateOrUpdateDecision {
    match current {
        None => CreateOrUpdateDecision::Create,
        Some(current) => {
            let patch = compute_patch(current, desired, schema);
            if patch.0.is_empty() {
                CreateOrUpdateDecision::NoOpEcho
            } else {
                CreateOrUpdateDecision::Update
            }
        }
    }
}

/// Validates that a create-vs-update body does not attempt to set a
/// read-only property (callers may use this before issuing `CreateResource`
/// so a client error surfaces as `InvalidRequest` rather than an opaque
/// Cloud Control rejection).
pub fn reject_read_only_writes(
    desired: &serde_json::Map<String, serde_json::Value>,
    schema: &TypeSchema,
) -> Result<(), UcpError> {
    let offending: Vec<&str> = schema
        .read_only_properties
        .iter()
        .map(String::as_str)
        .filter(|p| desired.contains_key(*p))
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(UcpError::InvalidRequest(format!(
            "cannot set read-only propert{}: {}",
            if offending.len() == 1 { "y" } else { "ies" },
            offending.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeSchema;

    fn kinesis_schema() -> TypeSchema {
        TypeSchema {
            primary_identifier: vec!["Name".to_string()],
            read_only_properties: vec!["Arn".to_string()],
            create_only_properties: vec!["Name".to_string()],
        }
    }

    #[test]
    fn identical_bodies_produce_no_op() {
        let current = serde_json::json!({ "Name": "ks1", "ShardCount": 1, "Arn": "arn:aws:..." });
        let desired = serde_json::json!({ "Name": "ks1", "ShardCount": 1 });
        let decision = decide(Some(&current), &desired, &kinesis_schema());
        assert_eq!(decision, CreateOrUpdateDecision::NoOpEcho);
    }

    #[test]
    fn read_only_divergence_is_filtered_out() {
        let current = serde_json::json!({ "Name": "ks1", "ShardCount": 1, "Arn": "arn:aws:old" });
        let desired = serde_json::json!({ "Name": "ks1", "ShardCount": 1, "Arn": "arn:aws:new" });
        let patch = compute_patch(&current, &desired, &kinesis_schema());
        assert!(patch.0.is_empty());
    }

    #[test]
    fn real_divergence_triggers_update() {
        let current = serde_json::json!({ "Name": "ks1", "ShardCount": 1 });
        let desired = serde_json::json!({ "Name": "ks1", "ShardCount": 2 });
        let decision = decide(Some(&current), &desired, &kinesis_schema());
        assert_eq!(decision, CreateOrUpdateDecision::Update);
    }

    #[test]
    fn missing_current_is_create() {
        let desired = serde_json::json!({ "Name": "ks1", "ShardCount": 1 });
        assert_eq!(decide(None, &desired, &kinesis_schema()), CreateOrUpdateDecision::Create);
    }

    #[test]
    fn create_only_property_cannot_be_set_on_create() {
        let mut desired = serde_json::Map::new();
        desired.insert("Name".to_string(), serde_json::json!("ks1"));
        // Name is create-only, not read-only, so this must succeed.
        assert!(reject_read_only_writes(&desired, &kinesis_schema()).is_ok());

        let mut with_arn = serde_json::Map::new();
        with_arn.insert("Arn".to_string(), serde_json::json!("arn:aws:x"));
        assert!(reject_read_only_writes(&with_arn, &kinesis_schema()).is_err());
    }
}
