//! Object identity

use std::fmt;

use kube::Resource;

/// Namespace + name of an object. Cluster-scoped objects have no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of an existing object, `None` if it has no name
    pub fn from_resource<K: Resource>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        let name = meta.name.clone().filter(|n| !n.is_empty())?;
        Some(Self {
            namespace: meta.namespace.clone(),
            name,
        })
    }

    /// Parse `namespace/name` (or a bare `name`)
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Some(Self::namespaced(ns, name))
            }
            Some(_) => None,
            None if !value.is_empty() => Some(Self::cluster(value)),
            None => None,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespaced() {
        let key = ObjectKey::parse("clusters/demo").unwrap();
        assert_eq!(key, ObjectKey::namespaced("clusters", "demo"));
        assert_eq!(key.to_string(), "clusters/demo");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ObjectKey::parse("").is_none());
        assert!(ObjectKey::parse("/demo").is_none());
        assert!(ObjectKey::parse("clusters/").is_none());
        assert!(ObjectKey::parse("a/b/c").is_none());
    }

    #[test]
    fn test_parse_bare_name() {
        assert_eq!(ObjectKey::parse("demo"), Some(ObjectKey::cluster("demo")));
    }
}
