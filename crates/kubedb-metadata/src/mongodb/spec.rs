//!
//! # MongoDB Spec
//!
//! Subset of the KubeDB `MongoDB` resource that this workspace reads and writes.
//! Unknown fields are ignored on decode.
//!
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::LocalObjectReference;
use crate::is_false;

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBSpec {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_set: Option<MongoDBReplicaSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_topology: Option<MongoDBShardTopology>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arbiter: Option<MongoArbiterNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<MongoHiddenNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<StorageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<PersistentVolumeClaimSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub halted: bool,
}

impl MongoDBSpec {
    pub fn is_sharded(&self) -> bool {
        self.shard_topology.is_some()
    }

    pub fn is_replica_set(&self) -> bool {
        !self.is_sharded() && self.replica_set.is_some()
    }
}

impl fmt::Display for MongoDBSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let topology = if self.is_sharded() {
            "sharded"
        } else if self.is_replica_set() {
            "replicaset"
        } else {
            "standalone"
        };
        write!(f, "version: {}, topology: {}", self.version, topology)
    }
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBReplicaSet {
    pub name: String,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBShardTopology {
    pub shard: MongoDBShardNode,
    pub config_server: MongoDBConfigNode,
    pub mongos: MongoDBMongosNode,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBShardNode {
    pub shards: i32,
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<PersistentVolumeClaimSpec>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBConfigNode {
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<PersistentVolumeClaimSpec>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBMongosNode {
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoArbiterNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoHiddenNode {
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<PersistentVolumeClaimSpec>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Copy, Eq, PartialEq)]
pub enum StorageType {
    #[default]
    Durable,
    Ephemeral,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeletionPolicy {
    Halt,
    #[default]
    Delete,
    WipeOut,
    DoNotTerminate,
}

/// Pod template as embedded by KubeDB, only the parts carrying resources
#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub spec: PodTemplateBody,
}

impl PodTemplateSpec {
    pub fn container(&self, name: &str) -> Option<&ContainerResources> {
        self.spec.containers.iter().find(|c| c.name == name)
    }
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateBody {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerResources>,
    /// legacy location of the database container resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// raw quantities as written in the object; parsed when resources are estimated
#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_topology() {
        let standalone = MongoDBSpec::default();
        assert!(!standalone.is_sharded());
        assert!(!standalone.is_replica_set());
        assert_eq!(standalone.to_string(), "version: , topology: standalone");

        let sharded = MongoDBSpec {
            version: "5.0.3".to_owned(),
            replica_set: Some(MongoDBReplicaSet {
                name: "ignored".to_owned(),
            }),
            shard_topology: Some(MongoDBShardTopology::default()),
            ..Default::default()
        };
        assert!(sharded.is_sharded());
        assert!(!sharded.is_replica_set());
    }

    #[test]
    fn test_minimal_spec_serialization() {
        let spec = MongoDBSpec {
            version: "5.0.3".to_owned(),
            replicas: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).expect("json");
        assert_eq!(json, serde_json::json!({"version": "5.0.3", "replicas": 1}));
    }
}
