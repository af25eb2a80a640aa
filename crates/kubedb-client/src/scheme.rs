//!
//! # Type registry
//!
//! Maps `apiVersion`/`kind` pairs to the Rust spec types the store client may
//! handle. A scheme is assembled once from an ordered list of contributors and
//! is immutable afterwards.
//!
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use k8_types::app::deployment::DeploymentSpec;
use k8_types::core::pod::PodSpec;
use k8_types::{K8Obj, Spec};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use kubedb_metadata::archiver::MongoDBArchiverSpec;
use kubedb_metadata::mongodb::MongoDBSpec;

#[derive(thiserror::Error, Debug)]
pub enum SchemeError {
    #[error("type {0} is not registered")]
    NotRegistered(TypeKey),
    #[error("type {0} is already registered with a different definition")]
    Conflict(TypeKey),
    #[error("{0} did not serialize to an object")]
    NotAnObject(TypeKey),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// `apiVersion` + `kind`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    pub api_version: String,
    pub kind: String,
}

impl TypeKey {
    pub fn of<S: Spec>() -> Self {
        Self {
            api_version: S::api_version(),
            kind: S::kind(),
        }
    }

    /// api group, empty for the core group
    pub fn group(&self) -> &str {
        match self.api_version.rsplit_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub key: TypeKey,
    pub plural: String,
    pub namespaced: bool,
    /// serialized `Default` of the spec, used to tell definitions apart
    pub default_spec: Value,
}

impl TypeInfo {
    fn of<S: Spec>() -> Result<Self, SchemeError> {
        Ok(Self {
            key: TypeKey::of::<S>(),
            plural: S::metadata().names.plural.to_owned(),
            namespaced: S::NAME_SPACED,
            default_spec: serde_json::to_value(S::default())?,
        })
    }
}

pub type Contributor = fn(&mut Scheme) -> Result<(), SchemeError>;

#[derive(Debug, Default)]
pub struct Scheme {
    types: HashMap<TypeKey, TypeInfo>,
}

impl Scheme {
    /// register `S`; registering the same definition twice is a no-op
    pub fn add_type<S: Spec>(&mut self) -> Result<(), SchemeError> {
        let info = TypeInfo::of::<S>()?;
        match self.types.get(&info.key) {
            Some(existing) if *existing == info => {
                trace!(key = %info.key, "type already registered");
                Ok(())
            }
            Some(_) => Err(SchemeError::Conflict(info.key)),
            None => {
                debug!(key = %info.key, "registering type");
                self.types.insert(info.key.clone(), info);
                Ok(())
            }
        }
    }

    pub fn is_registered<S: Spec>(&self) -> bool {
        self.types.contains_key(&TypeKey::of::<S>())
    }

    pub fn type_info<S: Spec>(&self) -> Result<&TypeInfo, SchemeError> {
        let key = TypeKey::of::<S>();
        self.types.get(&key).ok_or(SchemeError::NotRegistered(key))
    }

    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<&TypeInfo> {
        self.types.get(&TypeKey {
            api_version: api_version.to_owned(),
            kind: kind.to_owned(),
        })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// registered keys in stable order
    pub fn keys(&self) -> Vec<&TypeKey> {
        let mut keys: Vec<&TypeKey> = self.types.keys().collect();
        keys.sort();
        keys
    }

    /// generic attribute map of a typed object with `apiVersion` and `kind` set
    pub fn to_unstructured<S: Spec>(&self, obj: &K8Obj<S>) -> Result<Map<String, Value>, SchemeError> {
        let info = self.type_info::<S>()?;
        match serde_json::to_value(obj)? {
            Value::Object(mut map) => {
                map.insert(
                    "apiVersion".to_owned(),
                    Value::String(info.key.api_version.clone()),
                );
                map.insert("kind".to_owned(), Value::String(info.key.kind.clone()));
                Ok(map)
            }
            _ => Err(SchemeError::NotAnObject(info.key.clone())),
        }
    }
}

#[derive(Default)]
pub struct SchemeBuilder {
    contributors: Vec<Contributor>,
}

impl SchemeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, contributor: Contributor) -> Self {
        self.contributors.push(contributor);
        self
    }

    /// run contributors in registration order
    pub fn build(self) -> Result<Arc<Scheme>, SchemeError> {
        let mut scheme = Scheme::default();
        for contributor in self.contributors {
            contributor(&mut scheme)?;
        }
        debug!(types = scheme.len(), "scheme built");
        Ok(Arc::new(scheme))
    }
}

/// built-in kubernetes types used by the probe
pub fn add_core_types(scheme: &mut Scheme) -> Result<(), SchemeError> {
    scheme.add_type::<PodSpec>()?;
    scheme.add_type::<DeploymentSpec>()
}

pub fn add_kubedb_types(scheme: &mut Scheme) -> Result<(), SchemeError> {
    scheme.add_type::<MongoDBSpec>()
}

pub fn add_archiver_types(scheme: &mut Scheme) -> Result<(), SchemeError> {
    scheme.add_type::<MongoDBArchiverSpec>()
}

/// scheme with every type this workspace knows about
pub fn default_scheme() -> Result<Arc<Scheme>, SchemeError> {
    SchemeBuilder::new()
        .register(add_core_types)
        .register(add_kubedb_types)
        .register(add_archiver_types)
        .build()
}
