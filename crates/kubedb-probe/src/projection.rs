//!
//! # Per-item projection
//!
//! Turn each listed object into one line of output. A failure on one item is
//! logged and counted; it never stops the remaining items.
//!
use std::sync::Arc;

use tracing::{error, info};

use k8_types::{K8Obj, Spec};

use kubedb_client::scheme::{Scheme, SchemeError};
use kubedb_metadata::quantity::format_resource_list;

use crate::resource_metrics::{CalculatorError, CalculatorRegistry};

#[derive(thiserror::Error, Debug)]
pub enum ProjectionError {
    #[error("cannot convert object")]
    Scheme(#[from] SchemeError),
    #[error("cannot estimate resources")]
    Calculator(#[from] CalculatorError),
}

pub trait Projector<S: Spec> {
    fn project(&self, obj: &K8Obj<S>) -> Result<String, ProjectionError>;
}

impl<S, F> Projector<S> for F
where
    S: Spec,
    F: Fn(&K8Obj<S>) -> Result<String, ProjectionError>,
{
    fn project(&self, obj: &K8Obj<S>) -> Result<String, ProjectionError> {
        self(obj)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProjectionReport {
    pub projected: Vec<String>,
    pub failed: usize,
}

/// project every item in order
pub fn for_each_listed<S, P>(items: &[K8Obj<S>], projector: &P) -> ProjectionReport
where
    S: Spec,
    P: Projector<S> + ?Sized,
{
    let mut report = ProjectionReport::default();
    for obj in items {
        match projector.project(obj) {
            Ok(line) => {
                info!("{}", line);
                report.projected.push(line);
            }
            Err(err) => {
                error!(
                    key = %object_key(obj),
                    error = %error_chain(&err),
                    "projection failed"
                );
                report.failed += 1;
            }
        }
    }
    report
}

/// `namespace/name`
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityProjector;

impl<S: Spec> Projector<S> for IdentityProjector {
    fn project(&self, obj: &K8Obj<S>) -> Result<String, ProjectionError> {
        Ok(object_key(obj))
    }
}

/// `namespace/name: cpu=..,memory=..,storage=..`
#[derive(Debug, Clone)]
pub struct ResourceRequestProjector {
    scheme: Arc<Scheme>,
    registry: Arc<CalculatorRegistry>,
}

impl ResourceRequestProjector {
    pub fn new(scheme: Arc<Scheme>, registry: Arc<CalculatorRegistry>) -> Self {
        Self { scheme, registry }
    }
}

impl<S: Spec> Projector<S> for ResourceRequestProjector {
    fn project(&self, obj: &K8Obj<S>) -> Result<String, ProjectionError> {
        let unstructured = self.scheme.to_unstructured(obj)?;
        let requests = self.registry.pod_resource_requests(&unstructured)?;
        let rendered = if requests.is_empty() {
            "none".to_owned()
        } else {
            format_resource_list(&requests)
        };
        Ok(format!("{}: {}", object_key(obj), rendered))
    }
}

fn object_key<S: Spec>(obj: &K8Obj<S>) -> String {
    format!("{}/{}", obj.metadata.namespace, obj.metadata.name)
}

/// error with every source joined, for a single log field
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use k8_types::core::pod::PodSpec;

    use kubedb_client::scheme::{add_core_types, default_scheme, SchemeBuilder};
    use kubedb_metadata::mongodb::{
        ContainerResources, MongoDBSpec, PersistentVolumeClaimSpec, PodTemplateBody,
        PodTemplateSpec, ResourceRequirements,
    };

    use super::*;

    fn mongodb(name: &str, with_storage: bool) -> K8Obj<MongoDBSpec> {
        let resources = ResourceRequirements {
            requests: [("cpu", "500m"), ("memory", "1Gi")]
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            ..Default::default()
        };
        let storage = with_storage.then(|| PersistentVolumeClaimSpec {
            resources: ResourceRequirements {
                requests: [("storage".to_owned(), "10Gi".to_owned())].into(),
                ..Default::default()
            },
            ..Default::default()
        });
        let spec = MongoDBSpec {
            version: "5.0.3".to_owned(),
            pod_template: Some(PodTemplateSpec {
                spec: PodTemplateBody {
                    containers: vec![ContainerResources {
                        name: "mongodb".to_owned(),
                        resources,
                    }],
                    resources: None,
                },
            }),
            storage,
            ..Default::default()
        };
        let mut obj = K8Obj::new(name, spec);
        obj.metadata.namespace = "demo".to_owned();
        obj
    }

    #[test]
    fn test_empty_list_never_projects() {
        let calls = Cell::new(0);
        let projector = |obj: &K8Obj<MongoDBSpec>| -> Result<String, ProjectionError> {
            calls.set(calls.get() + 1);
            Ok(obj.metadata.name.clone())
        };
        let items: Vec<K8Obj<MongoDBSpec>> = vec![];
        let report = for_each_listed(&items, &projector);
        assert_eq!(calls.get(), 0);
        assert_eq!(report, ProjectionReport::default());
    }

    #[test]
    fn test_failure_does_not_stop_others() {
        let items = vec![mongodb("a", true), mongodb("b", true), mongodb("c", true)];
        let projector = |obj: &K8Obj<MongoDBSpec>| -> Result<String, ProjectionError> {
            if obj.metadata.name == "b" {
                Err(ProjectionError::Calculator(CalculatorError::MissingField(
                    "spec".to_owned(),
                )))
            } else {
                Ok(obj.metadata.name.clone())
            }
        };
        let report = for_each_listed(&items, &projector);
        assert_eq!(report.projected, vec!["a", "c"]);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_identity() {
        let items = vec![mongodb("a", true), mongodb("b", false)];
        let report = for_each_listed(&items, &IdentityProjector);
        assert_eq!(report.projected, vec!["demo/a", "demo/b"]);
    }

    #[test]
    fn test_resource_requests() {
        let projector = ResourceRequestProjector::new(
            default_scheme().expect("scheme"),
            Arc::new(CalculatorRegistry::with_defaults()),
        );
        let items = vec![mongodb("a", true), mongodb("b", false)];
        let report = for_each_listed(&items, &projector);
        assert_eq!(
            report.projected,
            vec!["demo/a: cpu=500m,memory=1Gi,storage=10Gi"]
        );
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_out_of_range_quantity_is_isolated() {
        let with_cpu = |name: &str, cpu: &str| {
            let mut obj = mongodb(name, true);
            if let Some(template) = obj.spec.pod_template.as_mut() {
                template.spec.containers[0]
                    .resources
                    .requests
                    .insert("cpu".to_owned(), cpu.to_owned());
            }
            obj
        };
        let projector = ResourceRequestProjector::new(
            default_scheme().expect("scheme"),
            Arc::new(CalculatorRegistry::with_defaults()),
        );
        let items = vec![
            with_cpu("a", "1"),
            with_cpu("b", "1e2147483647"),
            with_cpu("c", "2"),
        ];
        let report = for_each_listed(&items, &projector);
        assert_eq!(
            report.projected,
            vec![
                "demo/a: cpu=1,memory=1Gi,storage=10Gi",
                "demo/c: cpu=2,memory=1Gi,storage=10Gi"
            ]
        );
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_unregistered_type_fails_conversion() {
        let scheme = SchemeBuilder::new()
            .register(add_core_types)
            .build()
            .expect("scheme");
        let projector =
            ResourceRequestProjector::new(scheme, Arc::new(CalculatorRegistry::with_defaults()));
        let err = Projector::<MongoDBSpec>::project(&projector, &mongodb("a", true))
            .expect_err("unregistered");
        assert!(matches!(err, ProjectionError::Scheme(_)));

        // registered, but no calculator for pods
        let pod = K8Obj::new("p", PodSpec::default());
        let err = Projector::<PodSpec>::project(&projector, &pod).expect_err("no calculator");
        assert!(matches!(
            err,
            ProjectionError::Calculator(CalculatorError::NoCalculator { .. })
        ));
    }

    #[test]
    fn test_error_chain() {
        let err = ProjectionError::Calculator(CalculatorError::MissingField("spec".to_owned()));
        assert_eq!(error_chain(&err), "cannot estimate resources: missing field `spec`");
    }
}
