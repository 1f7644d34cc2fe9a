//! A small built-in registry of AWS CloudFormation resource-provider schema
//! facts needed by the adapter: primary-identifier order and which
//! properties are read-only or create-only (spec §4.4). A production build
//! would source these from the CloudFormation `DescribeType` API; this
//! registry is seeded for the resource types exercised by the test scenarios.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TypeSchema {
    pub primary_identifier: Vec<String>,
    pub read_only_properties: Vec<String>,
    pub create_only_properties: Vec<String>,
}

pub struct TypeSchemaRegistry {
    schemas: BTreeMap<String, TypeSchema>,
}

impl TypeSchemaRegistry {
    pub fn new() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "AWS::Kinesis::Stream".to_string(),
            TypeSchema {
                primary_identifier: vec!["Name".to_string()],
                read_only_properties: vec![
                    "Arn".to_string(),
                    "StreamEncryption/KeyId".to_string(),
                ],
                create_only_properties: vec!["Name".to_string()],
            },
        );
        Self { schemas }
    }

    pub fn register(&mut self, type_name: impl Into<String>, schema: TypeSchema) {
        self.schemas.insert(type_name.into(), schema);
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeSchema> {
        self.schemas.get(type_name)
    }
}

impl Default for TypeSchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinesis_stream_is_seeded() {
        let registry = TypeSchemaRegistry::new();
        let schema = registry.get("AWS::Kinesis::Stream").unwrap();
        assert_eq!(schema.primary_identifier, vec!["Name".to_string()]);
    }

    #[test]
    fn unknown_type_is_absent() {
        let registry = TypeSchemaRegistry::new();
        assert!(registry.get("AWS::Does::NotExist").is_none());
    }
}
