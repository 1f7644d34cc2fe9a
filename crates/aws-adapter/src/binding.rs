//! Friendly-name to Cloud Control identifier resolution (spec §4.4, §8
//! invariant 7: "after the first successful create with friendly name `f`,
//! all subsequent operations on `f` target the same Cloud Control ID until a
//! successful delete").

use crate::id::NameSuffix;
use crate::schema::TypeSchema;
use store::FriendlyNameBinding;
use ucp_errors::UcpError;

/// Resolves a parsed name suffix to a Cloud Control identifier, consulting
/// the friendly-name binding store only when the suffix isn't already a
/// `|`-joined primary-identifier tuple.
pub fn resolve_identifier(
    suffix: &NameSuffix,
    schema: &TypeSchema,
    binding: Option<&FriendlyNameBinding>,
) -> Result<Option<String>, UcpError> {
    match suffix {
        NameSuffix::PrimaryIdentifiers(values) => Ok(Some(join_primary_identifier(values))),
        NameSuffix::FriendlyName(name) => match binding {
            Some(b) => Ok(Some(b.cloud_control_id.clone())),
            None => {
                let _ = schema;
                let _ = name;
                Ok(None)
            }
        },
    }
}

/// Cloud Control joins multi-part primary identifiers with `|`; this mirrors
/// that convention for identifiers we construct ourselves.
pub fn join_primary_identifier(values: &[String]) -> String {
    values.join("|")
}

pub fn binding_for_create(
    plane_scope: &str,
    friendly_name: &str,
    cloud_control_id: &str,
    primary_identifier_values: Vec<String>,
) -> FriendlyNameBinding {
    FriendlyNameBinding {
        plane_scope: plane_scope.to_string(),
        friendly_name: friendly_name.to_string(),
        cloud_control_id: cloud_control_id.to_string(),
        primary_identifier_values,
    }
}
