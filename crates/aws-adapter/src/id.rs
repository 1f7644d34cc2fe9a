//! AWS virtual-verb ID shapes (spec §6, §9 Open Question on ID suffix
//! ambiguity): the `<name>` segment is either a friendly name or a
//! `|`-joined tuple of primary-identifier values, disambiguated by the
//! presence of `|` (a friendly name containing a literal `|` is rejected at
//! plane-registration time, out of scope to special-case further here).

use ucp_errors::UcpError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSuffix {
    FriendlyName(String),
    PrimaryIdentifiers(Vec<String>),
}

pub fn parse_name_suffix(raw: &str) -> Result<NameSuffix, UcpError> {
    if raw.is_empty() {
        return Err(UcpError::InvalidRequest("AWS resource name must not be empty".into()));
    }
    if raw.contains('|') {
        let parts: Vec<String> = raw.split('|').map(str::to_string).collect();
        if parts.iter().any(String::is_empty) {
            return Err(UcpError::InvalidRequest(format!(
                "primary-identifier suffix {raw} has an empty segment"
            )));
        }
        Ok(NameSuffix::PrimaryIdentifiers(parts))
    } else {
        Ok(NameSuffix::FriendlyName(raw.to_string()))
    }
}

/// Validates that a parsed `|`-joined suffix matches the type's declared
/// primary-identifier order length (spec §6: "MUST match the type's declared
/// primary-identifier order").
pub fn validate_primary_identifier_order(
    suffix: &NameSuffix,
    declared_order: &[String],
) -> Result<(), UcpError> {
    if let NameSuffix::PrimaryIdentifiers(values) = suffix {
        if values.len() != declared_order.len() {
            return Err(UcpError::InvalidRequest(format!(
                "expected {} primary identifier(s) ({}), got {}",
                declared_order.len(),
                declared_order.join(", "),
                values.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_is_a_friendly_name() {
        assert_eq!(
            parse_name_suffix("ks1").unwrap(),
            NameSuffix::FriendlyName("ks1".into())
        );
    }

    #[test]
    fn piped_name_is_primary_identifiers() {
        assert_eq!(
            parse_name_suffix("us-east-2|ks1").unwrap(),
            NameSuffix::PrimaryIdentifiers(vec!["us-east-2".into(), "ks1".into()])
        );
    }

    #[test]
    fn empty_segment_in_piped_name_is_rejected() {
        assert!(parse_name_suffix("us-east-2|").is_err());
    }

    #[test]
    fn primary_identifier_order_length_mismatch_is_rejected() {
        let suffix = NameSuffix::PrimaryIdentifiers(vec!["only-one".into()]);
        let declared = vec!["Region".to_string(), "StreamName".to_string()];
        assert!(validate_primary_identifier_order(&suffix, &declared).is_err());
    }
}
