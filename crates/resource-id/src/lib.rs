//! Parsing, formatting and comparison of Universal Resource IDs (URIs).
//!
//! A URI is an ordered sequence:
//!
//! ```text
//! /planes/<planeType>/<planeInstance>[/<scopeType>/<scopeName>]*/providers/<namespace>/<typeSegment>[/<typeSegment>]*
//! ```
//!
//! Two distinguished shapes exist: a *scope ID* (ends on a scope segment, no
//! `providers/...`) and a *resource ID* (has `providers/...` and at least one
//! typed segment).

use std::fmt;

/// A single `(scopeType, scopeName)` pair, e.g. `resourceGroups/my-rg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub kind: String,
    pub name: String,
}

/// A single `(type, name?)` pair beneath `providers/<namespace>`. Only the
/// trailing segment of a resource ID may omit `name` (a "list/collection"
/// segment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSegment {
    pub type_name: String,
    pub name: Option<String>,
}

/// A parsed Universal Resource ID. May represent either a scope ID or a
/// resource ID — see [`ResourceId::is_resource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    plane_type: String,
    plane_instance: String,
    scopes: Vec<Scope>,
    provider_namespace: Option<String>,
    types: Vec<TypeSegment>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("id must start with /planes/")]
    MissingPlanesPrefix,
    #[error("id is missing a plane instance")]
    MissingPlaneInstance,
    #[error("segment at byte {index} contains an illegal character")]
    IllegalCharacter { index: usize },
    #[error("scope segment at byte {index} is missing a name")]
    MissingScopeName { index: usize },
    #[error("typed segment at byte {index} is missing a name")]
    MissingTypeName { index: usize },
    #[error("only the trailing typed segment may omit a name")]
    NameRequiredExceptTrailing,
    #[error("expected 'providers' at byte {index}")]
    ExpectedProviders { index: usize },
    #[error("providers segment is missing a namespace")]
    MissingNamespace,
    #[error("expected a resource ID (providers/...) but got a scope ID")]
    NotAResource,
    #[error("id has a trailing slash or empty segment")]
    EmptySegment,
}

fn valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '|'
}

fn check_segment(s: &str, offset: usize) -> Result<(), ParseError> {
    if s.is_empty() {
        return Err(ParseError::EmptySegment);
    }
    if let Some(bad) = s.find(|c| !valid_char(c)) {
        return Err(ParseError::IllegalCharacter {
            index: offset + bad,
        });
    }
    Ok(())
}

impl ResourceId {
    /// Parses a URI that may be either a scope ID or a resource ID.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let rest = s
            .strip_prefix("/planes/")
            .ok_or(ParseError::MissingPlanesPrefix)?;

        // Track byte offsets against the original string for error reporting.
        let mut offset = "/planes/".len();
        let mut parts = rest.split('/').peekable();

        let plane_type = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| {
            ParseError::IllegalCharacter { index: offset }
        })?;
        check_segment(plane_type, offset)?;
        offset += plane_type.len() + 1;

        let plane_instance = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingPlaneInstance)?;
        check_segment(plane_instance, offset)?;
        offset += plane_instance.len() + 1;

        let plane_type = plane_type.to_string();
        let plane_instance = plane_instance.to_string();

        let mut scopes = Vec::new();
        let mut provider_namespace = None;
        let mut types = Vec::new();

        loop {
            let Some(first) = parts.next() else {
                break;
            };
            check_segment(first, offset)?;
            offset += first.len() + 1;

            if first.eq_ignore_ascii_case("providers") {
                let namespace = parts.next().ok_or(ParseError::MissingNamespace)?;
                check_segment(namespace, offset)?;
                offset += namespace.len() + 1;
                provider_namespace = Some(namespace.to_string());

                loop {
                    let Some(type_name) = parts.next() else {
                        break;
                    };
                    check_segment(type_name, offset)?;
                    offset += type_name.len() + 1;

                    let name = parts.next();
                    let name = match name {
                        Some(n) => {
                            check_segment(n, offset)?;
                            offset += n.len() + 1;
                            Some(n.to_string())
                        }
                        None => None,
                    };
                    types.push(TypeSegment {
                        type_name: type_name.to_string(),
                        name,
                    });
                }
                break;
            } else {
                // A scope segment: `first` is the scope kind, and it must be
                // followed by a name.
                let name = parts
                    .next()
                    .ok_or(ParseError::MissingScopeName { index: offset })?;
                check_segment(name, offset)?;
                offset += name.len() + 1;
                scopes.push(Scope {
                    kind: first.to_string(),
                    name: name.to_string(),
                });
            }
        }

        // Only the last typed segment may omit a name.
        if let Some((last, rest)) = types.split_last() {
            if rest.iter().any(|t| t.name.is_none()) {
                return Err(ParseError::NameRequiredExceptTrailing);
            }
            let _ = last;
        }

        Ok(ResourceId {
            plane_type,
            plane_instance,
            scopes,
            provider_namespace,
            types,
        })
    }

    /// Parses a URI, failing with [`ParseError::NotAResource`] if it is not a
    /// resource ID (i.e. lacks `providers/...` and a typed segment).
    pub fn parse_resource(s: &str) -> Result<Self, ParseError> {
        let id = Self::parse(s)?;
        if !id.is_resource() {
            return Err(ParseError::NotAResource);
        }
        Ok(id)
    }

    pub fn is_resource(&self) -> bool {
        self.provider_namespace.is_some() && !self.types.is_empty()
    }

    pub fn plane_type(&self) -> &str {
        &self.plane_type
    }

    pub fn plane_instance(&self) -> &str {
        &self.plane_instance
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn provider_namespace(&self) -> Option<&str> {
        self.provider_namespace.as_deref()
    }

    pub fn types(&self) -> &[TypeSegment] {
        &self.types
    }

    /// Returns the name of the first scope of the given kind (case
    /// insensitive), or an empty string if none matches.
    pub fn find_scope(&self, kind: &str) -> &str {
        self.scopes
            .iter()
            .find(|s| s.kind.eq_ignore_ascii_case(kind))
            .map(|s| s.name.as_str())
            .unwrap_or("")
    }

    /// Returns a new ID truncated to the first `depth` typed segments. A
    /// `depth` of 0 returns the enclosing scope ID (no `providers/...`).
    /// Panics if `depth` exceeds the number of typed segments present.
    pub fn truncate(&self, depth: usize) -> ResourceId {
        assert!(
            depth <= self.types.len(),
            "truncate depth {depth} exceeds {} typed segments",
            self.types.len()
        );
        if depth == 0 {
            return ResourceId {
                plane_type: self.plane_type.clone(),
                plane_instance: self.plane_instance.clone(),
                scopes: self.scopes.clone(),
                provider_namespace: None,
                types: Vec::new(),
            };
        }
        ResourceId {
            plane_type: self.plane_type.clone(),
            plane_instance: self.plane_instance.clone(),
            scopes: self.scopes.clone(),
            provider_namespace: self.provider_namespace.clone(),
            types: self.types[..depth].to_vec(),
        }
    }

    /// Returns true if `self` is a strict descendant of `other`: `other`'s
    /// scopes and typed-segment prefix match `self`'s, and `self` carries at
    /// least one additional segment.
    pub fn is_child_of(&self, other: &ResourceId) -> bool {
        if !self.plane_type.eq_ignore_ascii_case(&other.plane_type)
            || !self
                .plane_instance
                .eq_ignore_ascii_case(&other.plane_instance)
        {
            return false;
        }
        if other.scopes.len() > self.scopes.len() {
            return false;
        }
        if !scopes_eq(&self.scopes[..other.scopes.len()], &other.scopes) {
            return false;
        }
        match (&other.provider_namespace, &self.provider_namespace) {
            (None, None) => self.scopes.len() > other.scopes.len(),
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => {
                if !a.eq_ignore_ascii_case(b) {
                    return false;
                }
                if other.types.len() > self.types.len() {
                    return false;
                }
                if !types_eq(&self.types[..other.types.len()], &other.types) {
                    return false;
                }
                self.types.len() > other.types.len()
                    || self.scopes.len() > other.scopes.len()
            }
        }
    }
}

fn scopes_eq(a: &[Scope], b: &[Scope]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.kind.eq_ignore_ascii_case(&y.kind) && x.name.eq_ignore_ascii_case(&y.name))
}

fn types_eq(a: &[TypeSegment], b: &[TypeSegment]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.type_name.eq_ignore_ascii_case(&y.type_name)
                && match (&x.name, &y.name) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    (None, None) => true,
                    _ => false,
                }
        })
}

/// Segment-wise, case-insensitive equality of two IDs.
pub fn equal(a: &ResourceId, b: &ResourceId) -> bool {
    a.plane_type.eq_ignore_ascii_case(&b.plane_type)
        && a.plane_instance.eq_ignore_ascii_case(&b.plane_instance)
        && scopes_eq(&a.scopes, &b.scopes)
        && match (&a.provider_namespace, &b.provider_namespace) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            (None, None) => true,
            _ => false,
        }
        && types_eq(&a.types, &b.types)
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/planes/{}/{}", self.plane_type, self.plane_instance)?;
        for scope in &self.scopes {
            write!(f, "/{}/{}", scope.kind, scope.name)?;
        }
        if let Some(namespace) = &self.provider_namespace {
            write!(f, "/providers/{namespace}")?;
            for t in &self.types {
                write!(f, "/{}", t.type_name)?;
                if let Some(name) = &t.name {
                    write!(f, "/{name}")?;
                }
            }
        }
        Ok(())
    }
}

/// Formats `id` back to its canonical string form. Round-trips `parse` for
/// every valid input (modulo case normalization of segment *types*, which
/// `parse` does not itself normalize — case is preserved as written).
pub fn format(id: &ResourceId) -> String {
    id.to_string()
}

impl serde::Serialize for ResourceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ResourceId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        ResourceId::parse(&s).map_err(|err| D::Error::custom(format!("invalid resource id: {err}")))
    }
}
