//!
//! # Resource calculators
//!
//! Estimate what a database object asks of the cluster, summed over every pod
//! it would run. Calculators read the unstructured form of an object so they
//! work for any registered kind without a typed dependency.
//!
use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::trace;

use kubedb_metadata::defaults::{KUBEDB_GROUP, MONGODB_CONTAINER_NAME};
use kubedb_metadata::quantity::{
    add_resource_list, multiply_resource_list, Quantity, QuantityError, ResourceList,
    RESOURCE_STORAGE,
};

const MONGODB_KIND: &str = "MongoDB";

#[derive(thiserror::Error, Debug)]
pub enum CalculatorError {
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{field}` is not {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },
    #[error("invalid quantity in `{field}`")]
    Quantity {
        field: String,
        #[source]
        source: QuantityError,
    },
    #[error("no resource calculator for {group}/{kind}")]
    NoCalculator { group: String, kind: String },
}

pub trait ResourceCalculator: Send + Sync {
    /// total requests of every pod the object would create
    fn pod_resource_requests(&self, obj: &Map<String, Value>)
    -> Result<ResourceList, CalculatorError>;
}

/// Calculators keyed by API group and kind
#[derive(Default)]
pub struct CalculatorRegistry {
    calculators: HashMap<(String, String), Box<dyn ResourceCalculator>>,
}

impl fmt::Debug for CalculatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CalculatorRegistry")
            .field("kinds", &self.calculators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CalculatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// registry knowing every kubedb kind this crate can estimate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(KUBEDB_GROUP, MONGODB_KIND, MongoDbCalculator);
        registry
    }

    pub fn register<C>(&mut self, group: impl Into<String>, kind: impl Into<String>, calculator: C)
    where
        C: ResourceCalculator + 'static,
    {
        self.calculators
            .insert((group.into(), kind.into()), Box::new(calculator));
    }

    pub fn get(&self, group: &str, kind: &str) -> Option<&dyn ResourceCalculator> {
        self.calculators
            .get(&(group.to_owned(), kind.to_owned()))
            .map(|calculator| calculator.as_ref())
    }

    /// dispatch on `apiVersion` and `kind` of the object
    pub fn pod_resource_requests(
        &self,
        obj: &Map<String, Value>,
    ) -> Result<ResourceList, CalculatorError> {
        let api_version = required_str(obj, "apiVersion", "apiVersion")?;
        let kind = required_str(obj, "kind", "kind")?;
        let group = api_version
            .split_once('/')
            .map(|(group, _)| group)
            .unwrap_or_default();

        let calculator = self
            .get(group, kind)
            .ok_or_else(|| CalculatorError::NoCalculator {
                group: group.to_owned(),
                kind: kind.to_owned(),
            })?;
        calculator.pod_resource_requests(obj)
    }
}

/// Requests of a `MongoDB` across standalone, replica set and sharded topologies
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoDbCalculator;

impl ResourceCalculator for MongoDbCalculator {
    fn pod_resource_requests(
        &self,
        obj: &Map<String, Value>,
    ) -> Result<ResourceList, CalculatorError> {
        let spec = required_object(obj, "spec", "spec")?;

        if optional_bool(spec, "halted", "spec.halted")?.unwrap_or(false) {
            trace!("halted database, no pods");
            return Ok(ResourceList::new());
        }

        let durable = match optional_str(spec, "storageType", "spec.storageType")? {
            None | Some("Durable") => true,
            Some("Ephemeral") => false,
            Some(_) => {
                return Err(CalculatorError::InvalidField {
                    field: "spec.storageType".to_owned(),
                    expected: "Durable or Ephemeral",
                });
            }
        };

        let mut total = ResourceList::new();

        if let Some(topology) = optional_object(spec, "shardTopology", "spec.shardTopology")? {
            let shard = required_object(topology, "shard", "spec.shardTopology.shard")?;
            let shards = required_int(shard, "shards", "spec.shardTopology.shard.shards")?;
            let replicas = required_int(shard, "replicas", "spec.shardTopology.shard.replicas")?;
            let per_pod = node_requests(shard, "spec.shardTopology.shard", durable)?;
            add_resource_list(&mut total, &multiply_resource_list(&per_pod, shards * replicas));

            let config = required_object(topology, "configServer", "spec.shardTopology.configServer")?;
            let replicas = required_int(config, "replicas", "spec.shardTopology.configServer.replicas")?;
            let per_pod = node_requests(config, "spec.shardTopology.configServer", durable)?;
            add_resource_list(&mut total, &multiply_resource_list(&per_pod, replicas));

            let mongos = required_object(topology, "mongos", "spec.shardTopology.mongos")?;
            let replicas = required_int(mongos, "replicas", "spec.shardTopology.mongos.replicas")?;
            let per_pod = node_requests(mongos, "spec.shardTopology.mongos", false)?;
            add_resource_list(&mut total, &multiply_resource_list(&per_pod, replicas));
        } else if spec.contains_key("replicaSet") {
            let replicas = optional_int(spec, "replicas", "spec.replicas")?.unwrap_or(1);
            let per_pod = node_requests(spec, "spec", durable)?;
            add_resource_list(&mut total, &multiply_resource_list(&per_pod, replicas));

            if let Some(arbiter) = optional_object(spec, "arbiter", "spec.arbiter")? {
                add_resource_list(&mut total, &node_requests(arbiter, "spec.arbiter", false)?);
            }

            if let Some(hidden) = optional_object(spec, "hidden", "spec.hidden")? {
                let replicas = required_int(hidden, "replicas", "spec.hidden.replicas")?;
                let per_pod = node_requests(hidden, "spec.hidden", durable)?;
                add_resource_list(&mut total, &multiply_resource_list(&per_pod, replicas));
            }
        } else {
            add_resource_list(&mut total, &node_requests(spec, "spec", durable)?);
        }

        Ok(total)
    }
}

/// Requests of one pod of a node: the database container plus, for
/// data-bearing nodes, the persistent volume claim.
fn node_requests(
    node: &Map<String, Value>,
    path: &str,
    with_storage: bool,
) -> Result<ResourceList, CalculatorError> {
    let mut requests = ResourceList::new();

    let template_path = format!("{path}.podTemplate");
    if let Some(template) = optional_object(node, "podTemplate", &template_path)? {
        if let Some((resources, resources_path)) = container_resources(template, &template_path)? {
            requests = effective_requests(resources, &resources_path)?;
        }
    }

    if with_storage {
        let storage_path = format!("{path}.storage");
        let storage = required_object(node, "storage", &storage_path)?;
        let resources = required_object(storage, "resources", &format!("{storage_path}.resources"))?;
        let storage_requests = required_object(
            resources,
            "requests",
            &format!("{storage_path}.resources.requests"),
        )?;
        let field = format!("{storage_path}.resources.requests.storage");
        let raw = storage_requests
            .get(RESOURCE_STORAGE)
            .ok_or_else(|| CalculatorError::MissingField(field.clone()))?;
        requests.insert(RESOURCE_STORAGE.to_owned(), parse_quantity(raw, &field)?);
    }

    Ok(requests)
}

/// resources of the `mongodb` container, falling back to the template wide block
fn container_resources<'a>(
    template: &'a Map<String, Value>,
    path: &str,
) -> Result<Option<(&'a Map<String, Value>, String)>, CalculatorError> {
    let spec_path = format!("{path}.spec");
    let Some(spec) = optional_object(template, "spec", &spec_path)? else {
        return Ok(None);
    };

    if let Some(containers) = spec.get("containers") {
        let containers = containers
            .as_array()
            .ok_or_else(|| CalculatorError::InvalidField {
                field: format!("{spec_path}.containers"),
                expected: "an array",
            })?;
        let database = containers.iter().filter_map(Value::as_object).find(|c| {
            c.get("name").and_then(Value::as_str) == Some(MONGODB_CONTAINER_NAME)
        });
        if let Some(container) = database {
            let container_path = format!("{spec_path}.containers[{MONGODB_CONTAINER_NAME}]");
            if let Some(resources) =
                optional_object(container, "resources", &format!("{container_path}.resources"))?
            {
                return Ok(Some((resources, format!("{container_path}.resources"))));
            }
        }
    }

    let resources_path = format!("{spec_path}.resources");
    Ok(optional_object(spec, "resources", &resources_path)?
        .map(|resources| (resources, resources_path)))
}

/// limits stand in for requests that are not set
fn effective_requests(
    resources: &Map<String, Value>,
    path: &str,
) -> Result<ResourceList, CalculatorError> {
    let mut effective = ResourceList::new();
    for section in ["limits", "requests"] {
        let section_path = format!("{path}.{section}");
        if let Some(values) = optional_object(resources, section, &section_path)? {
            for (name, raw) in values {
                let quantity = parse_quantity(raw, &format!("{section_path}.{name}"))?;
                effective.insert(name.clone(), quantity);
            }
        }
    }
    Ok(effective)
}

fn parse_quantity(raw: &Value, field: &str) -> Result<Quantity, CalculatorError> {
    let text = match raw {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => {
            return Err(CalculatorError::InvalidField {
                field: field.to_owned(),
                expected: "a quantity",
            });
        }
    };
    Quantity::parse(&text).map_err(|source| CalculatorError::Quantity {
        field: field.to_owned(),
        source,
    })
}

fn required_object<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'a Map<String, Value>, CalculatorError> {
    optional_object(map, key, field)?.ok_or_else(|| CalculatorError::MissingField(field.to_owned()))
}

fn optional_object<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<Option<&'a Map<String, Value>>, CalculatorError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(_) => Err(CalculatorError::InvalidField {
            field: field.to_owned(),
            expected: "an object",
        }),
    }
}

fn required_str<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'a str, CalculatorError> {
    optional_str(map, key, field)?.ok_or_else(|| CalculatorError::MissingField(field.to_owned()))
}

fn optional_str<'a>(
    map: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<Option<&'a str>, CalculatorError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(CalculatorError::InvalidField {
            field: field.to_owned(),
            expected: "a string",
        }),
    }
}

fn required_int(map: &Map<String, Value>, key: &str, field: &str) -> Result<i64, CalculatorError> {
    optional_int(map, key, field)?.ok_or_else(|| CalculatorError::MissingField(field.to_owned()))
}

fn optional_int(
    map: &Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<Option<i64>, CalculatorError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .filter(|count| *count >= 0)
            .map(Some)
            .ok_or_else(|| CalculatorError::InvalidField {
                field: field.to_owned(),
                expected: "a non-negative integer",
            }),
    }
}

fn optional_bool(
    map: &Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<Option<bool>, CalculatorError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(CalculatorError::InvalidField {
            field: field.to_owned(),
            expected: "a boolean",
        }),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use kubedb_metadata::quantity::format_resource_list;

    use super::*;

    fn mongodb(spec: Value) -> Map<String, Value> {
        let obj = json!({
            "apiVersion": "kubedb.com/v1alpha2",
            "kind": "MongoDB",
            "metadata": { "name": "mg", "namespace": "demo" },
            "spec": spec,
        });
        match obj {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn template(cpu: &str, memory: &str) -> Value {
        json!({
            "spec": {
                "containers": [
                    { "name": "sidecar", "resources": { "requests": { "cpu": "9" } } },
                    { "name": "mongodb", "resources": { "requests": { "cpu": cpu, "memory": memory } } }
                ]
            }
        })
    }

    fn storage(size: &str) -> Value {
        json!({ "resources": { "requests": { "storage": size } } })
    }

    fn requests(obj: &Map<String, Value>) -> String {
        let list = CalculatorRegistry::with_defaults()
            .pod_resource_requests(obj)
            .expect("requests");
        format_resource_list(&list)
    }

    #[test]
    fn test_standalone() {
        let obj = mongodb(json!({
            "version": "5.0.3",
            "podTemplate": template("500m", "1Gi"),
            "storage": storage("10Gi"),
        }));
        assert_eq!(requests(&obj), "cpu=500m,memory=1Gi,storage=10Gi");
    }

    #[test]
    fn test_replica_set_with_arbiter_and_hidden() {
        let obj = mongodb(json!({
            "version": "5.0.3",
            "replicas": 3,
            "replicaSet": { "name": "rs0" },
            "podTemplate": template("500m", "1Gi"),
            "storage": storage("10Gi"),
            "arbiter": { "podTemplate": template("100m", "256Mi") },
            "hidden": {
                "replicas": 2,
                "podTemplate": template("1", "2Gi"),
                "storage": storage("20Gi"),
            },
        }));
        // 3 * (500m, 1Gi, 10Gi) + (100m, 256Mi) + 2 * (1, 2Gi, 20Gi)
        assert_eq!(requests(&obj), "cpu=3600m,memory=7424Mi,storage=70Gi");
    }

    #[test]
    fn test_sharded() {
        let obj = mongodb(json!({
            "version": "5.0.3",
            "shardTopology": {
                "shard": {
                    "shards": 2,
                    "replicas": 3,
                    "podTemplate": template("1", "1Gi"),
                    "storage": storage("10Gi"),
                },
                "configServer": {
                    "replicas": 3,
                    "podTemplate": template("500m", "512Mi"),
                    "storage": storage("2Gi"),
                },
                "mongos": {
                    "replicas": 2,
                    "podTemplate": template("250m", "256Mi"),
                },
            },
        }));
        // 6 shard pods, 3 config servers, 2 mongos
        assert_eq!(requests(&obj), "cpu=8,memory=8Gi,storage=66Gi");
    }

    #[test]
    fn test_limits_fill_missing_requests() {
        let obj = mongodb(json!({
            "version": "5.0.3",
            "storageType": "Ephemeral",
            "podTemplate": {
                "spec": {
                    "resources": {
                        "limits": { "cpu": "2", "memory": "4Gi" },
                        "requests": { "cpu": "1" },
                    }
                }
            },
        }));
        assert_eq!(requests(&obj), "cpu=1,memory=4Gi");
    }

    #[test]
    fn test_halted_requests_nothing() {
        let obj = mongodb(json!({ "version": "5.0.3", "halted": true }));
        assert_eq!(requests(&obj), "");
    }

    #[test]
    fn test_missing_storage_is_error() {
        let obj = mongodb(json!({ "version": "5.0.3", "replicas": 1 }));
        let err = MongoDbCalculator
            .pod_resource_requests(&obj)
            .expect_err("missing storage");
        assert!(matches!(err, CalculatorError::MissingField(field) if field == "spec.storage"));
    }

    #[test]
    fn test_bad_quantity_is_error() {
        let obj = mongodb(json!({
            "version": "5.0.3",
            "podTemplate": template("lots", "1Gi"),
            "storage": storage("10Gi"),
        }));
        let err = MongoDbCalculator
            .pod_resource_requests(&obj)
            .expect_err("bad quantity");
        assert!(matches!(err, CalculatorError::Quantity { .. }));
    }

    #[test]
    fn test_unknown_kind() {
        let mut obj = mongodb(json!({}));
        obj.insert("kind".to_owned(), json!("Postgres"));
        let err = CalculatorRegistry::with_defaults()
            .pod_resource_requests(&obj)
            .expect_err("no calculator");
        assert!(matches!(err, CalculatorError::NoCalculator { kind, .. } if kind == "Postgres"));
    }
}
