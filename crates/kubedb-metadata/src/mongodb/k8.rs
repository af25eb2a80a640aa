use crate::k8_types::{Crd, CrdNames, DefaultHeader, Spec, Status};
use crate::defaults::{KUBEDB_GROUP, KUBEDB_VERSION};

use super::MongoDBSpec;
use super::MongoDBStatus;

const MONGODB_API: Crd = Crd {
    group: KUBEDB_GROUP,
    version: KUBEDB_VERSION,
    names: CrdNames {
        kind: "MongoDB",
        plural: "mongodbs",
        singular: "mongodb",
    },
};

impl Spec for MongoDBSpec {
    type Status = MongoDBStatus;
    type Header = DefaultHeader;

    fn metadata() -> &'static Crd {
        &MONGODB_API
    }
}

impl Status for MongoDBStatus {}

#[cfg(test)]
mod test {
    use crate::k8_types::{K8Obj, Spec};

    use super::MongoDBSpec;

    #[test]
    fn test_api_version() {
        assert_eq!(MongoDBSpec::api_version(), "kubedb.com/v1alpha2");
        assert_eq!(MongoDBSpec::kind(), "MongoDB");
        assert_eq!(MongoDBSpec::metadata().names.plural, "mongodbs");
    }

    #[test]
    fn test_decode_replica_set() {
        let yaml = r#"
apiVersion: kubedb.com/v1alpha2
kind: MongoDB
metadata:
  name: mg-rs
  namespace: demo
  resourceVersion: "42"
spec:
  version: "4.4.26"
  replicas: 3
  replicaSet:
    name: rs0
  storageType: Durable
  storage:
    resources:
      requests:
        storage: 1Gi
  podTemplate:
    spec:
      containers:
        - name: mongodb
          resources:
            requests:
              cpu: 500m
              memory: 1Gi
  deletionPolicy: WipeOut
status:
  phase: Ready
  observedGeneration: 2
"#;
        let obj: K8Obj<MongoDBSpec> = serde_yaml::from_str(yaml).expect("yaml");
        assert_eq!(obj.metadata.name, "mg-rs");
        assert_eq!(obj.spec.replicas, Some(3));
        assert!(obj.spec.is_replica_set());
        assert_eq!(
            obj.spec
                .pod_template
                .as_ref()
                .and_then(|t| t.container("mongodb"))
                .map(|c| c.resources.requests["cpu"].as_str()),
            Some("500m")
        );
        assert_eq!(obj.status.phase.as_deref(), Some("Ready"));
    }
}
