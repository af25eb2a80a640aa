use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to an object which may live in another namespace
#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectReference {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// reference to object in the same namespace as the referrer
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Reference to an object in the same namespace
#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    pub name: String,
}

#[cfg(test)]
mod test {
    use super::ObjectReference;

    #[test]
    fn test_reference_display() {
        assert_eq!(
            ObjectReference::new("stash", "default").to_string(),
            "stash/default"
        );
        assert_eq!(ObjectReference::local("default").to_string(), "default");
    }

    #[test]
    fn test_local_reference_omits_namespace() {
        let json = serde_json::to_string(&ObjectReference::local("keep-1mo")).expect("json");
        assert_eq!(json, r#"{"name":"keep-1mo"}"#);
    }
}
