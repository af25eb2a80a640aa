//!
//! # In-memory metadata client
//!
//! A `MetadataClient` backed by process memory. Objects are kept as json per
//! kind, every write bumps a store wide resource version and is broadcast to
//! open watches. Used to run store, cache and command logic without a cluster.
//!
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_channel::{unbounded, Sender};
use async_lock::{Mutex, RwLock};
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use k8_client::meta_client::{
    ListArg, MetadataClient, NameSpace, ObjectKeyNotFound, PatchMergeType, TokenStreamResult,
};
use k8_types::options::DeleteOptions;
use k8_types::{
    DeleteStatus, InputK8Obj, K8List, K8Meta, K8Obj, K8Watch, ListMetadata, MetaStatus, Spec,
    StatusEnum, UpdateK8ObjStatus,
};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{api_error, STATUS_CONFLICT, STATUS_INVALID, STATUS_NOT_FOUND};
use crate::merge_patch;
use crate::selector::{FieldSelector, FIELD_NAME, FIELD_NAMESPACE};

const STATUS_BAD_REQUEST: u16 = 400;
const STATUS_UNSUPPORTED_MEDIA: u16 = 415;

type ObjectKey = (String, String);

#[derive(Debug, Clone, Copy)]
enum WatchKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
struct WatchRecord {
    version: u64,
    kind: WatchKind,
    object: Value,
}

impl WatchRecord {
    fn to_watch<S: Spec>(&self) -> Result<K8Watch<S>> {
        let obj: K8Obj<S> = serde_json::from_value(self.object.clone())?;
        Ok(match self.kind {
            WatchKind::Added => K8Watch::ADDED(obj),
            WatchKind::Modified => K8Watch::MODIFIED(obj),
            WatchKind::Deleted => K8Watch::DELETED(obj),
        })
    }
}

#[derive(Debug, Default)]
struct KindState {
    objects: BTreeMap<ObjectKey, Value>,
    history: Vec<WatchRecord>,
    watchers: Vec<Sender<WatchRecord>>,
}

impl KindState {
    fn record(&mut self, version: u64, kind: WatchKind, object: Value) {
        let record = WatchRecord {
            version,
            kind,
            object,
        };
        // closed watchers are dropped here
        self.watchers
            .retain(|watcher| watcher.try_send(record.clone()).is_ok());
        self.history.push(record);
    }
}

#[derive(Debug, Default)]
pub struct MemoryClient {
    stores: Mutex<HashMap<String, Arc<RwLock<KindState>>>>,
    version: AtomicU64,
    injected_conflicts: AtomicUsize,
}

impl MemoryClient {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// fail the next `count` patch requests with a conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// number of objects of `S` currently stored
    pub async fn count<S: Spec>(&self) -> usize {
        self.store::<S>().await.read().await.objects.len()
    }

    /// current store wide resource version
    pub fn resource_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    async fn store<S: Spec>(&self) -> Arc<RwLock<KindState>> {
        let key = format!("{}/{}", S::api_version(), S::kind());
        let mut stores = self.stores.lock().await;
        stores.entry(key).or_default().clone()
    }

    async fn apply_patch<S, M>(
        &self,
        metadata: &M,
        patch: &Value,
        merge_type: PatchMergeType,
        section: &str,
    ) -> Result<K8Obj<S>>
    where
        S: Spec,
        M: K8Meta,
    {
        if !matches!(merge_type, PatchMergeType::JsonMerge) {
            return Err(api_error(
                STATUS_UNSUPPORTED_MEDIA,
                "UnsupportedMediaType",
                "only json merge patches are supported",
            ));
        }

        let key = (metadata.namespace().to_owned(), metadata.name().to_owned());
        let store = self.store::<S>().await;
        let mut state = store.write().await;

        let Some(current) = state.objects.get(&key) else {
            return Err(api_error(
                STATUS_NOT_FOUND,
                "NotFound",
                format!("{} \"{}\" not found", S::metadata().names.plural, key.1),
            ));
        };

        let current_version = current["metadata"]["resourceVersion"].clone();
        if let Some(expected) = patch.pointer("/metadata/resourceVersion") {
            if *expected != current_version {
                return Err(api_error(
                    STATUS_CONFLICT,
                    "Conflict",
                    format!(
                        "the object has been modified; resourceVersion {expected} is stale, current {current_version}"
                    ),
                ));
            }
        }

        if self.take_injected_conflict() {
            return Err(api_error(
                STATUS_CONFLICT,
                "Conflict",
                "the object has been modified; please apply your changes to the latest version",
            ));
        }

        let mut updated = current.clone();
        if let Some(section_patch) = patch.get(section) {
            let target = updated
                .as_object_mut()
                .map(|map| map.entry(section.to_owned()).or_insert(Value::Null));
            if let Some(target) = target {
                merge_patch::apply(target, section_patch);
            }
        }
        if let Some(Value::Object(labels)) = patch.pointer("/metadata/labels") {
            merge_patch::apply(
                &mut updated["metadata"]["labels"],
                &Value::Object(labels.clone()),
            );
        }

        if updated == *current {
            trace!(name = %key.1, "patch is a no-op");
            return Ok(serde_json::from_value(updated)?);
        }

        // decode before committing so a bad patch leaves the store untouched
        let version = self.next_version();
        updated["metadata"]["resourceVersion"] = Value::String(version.to_string());
        let typed: K8Obj<S> = serde_json::from_value(updated.clone())?;

        state.objects.insert(key, updated.clone());
        state.record(version, WatchKind::Modified, updated);
        debug!(kind = %S::kind(), name = %metadata.name(), version, section, "patched");

        Ok(typed)
    }
}

fn namespace_filter(namespace: NameSpace) -> Option<String> {
    match namespace {
        NameSpace::All => None,
        NameSpace::Named(name) => Some(name),
    }
}

fn check_field(field: &str) -> Result<()> {
    match field {
        FIELD_NAME | FIELD_NAMESPACE => Ok(()),
        other => Err(api_error(
            STATUS_BAD_REQUEST,
            "BadRequest",
            format!("field label not supported: {other}"),
        )),
    }
}

/// value of a field already accepted by `check_field`
fn field_value<'a>(key: &'a ObjectKey, field: &str) -> &'a str {
    if field == FIELD_NAMESPACE {
        &key.0
    } else {
        &key.1
    }
}

#[async_trait::async_trait]
impl MetadataClient for MemoryClient {
    async fn retrieve_item<S, M>(&self, metadata: &M) -> Result<Option<K8Obj<S>>>
    where
        S: Spec,
        M: K8Meta + Send + Sync,
    {
        let key = (metadata.namespace().to_owned(), metadata.name().to_owned());
        let store = self.store::<S>().await;
        let state = store.read().await;
        match state.objects.get(&key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn retrieve_items_with_option<S, N>(
        &self,
        namespace: N,
        option: Option<ListArg>,
    ) -> Result<K8List<S>>
    where
        S: Spec,
        N: Into<NameSpace> + Send + Sync,
    {
        let namespace = namespace_filter(namespace.into());
        let selector = match option.and_then(|arg| arg.field_selector) {
            Some(raw) => FieldSelector::parse(&raw)
                .map_err(|err| api_error(STATUS_BAD_REQUEST, "BadRequest", err.to_string()))?,
            None => FieldSelector::default(),
        };
        // unsupported labels are rejected even when nothing is stored
        for requirement in selector.requirements() {
            check_field(&requirement.field)?;
        }

        let store = self.store::<S>().await;
        let state = store.read().await;

        let mut items = vec![];
        for (key, value) in state.objects.iter() {
            if namespace.as_ref().is_some_and(|ns| *ns != key.0) {
                continue;
            }
            let mut selected = true;
            for requirement in selector.requirements() {
                if !requirement.matches(Some(field_value(key, &requirement.field))) {
                    selected = false;
                    break;
                }
            }
            if selected {
                items.push(serde_json::from_value(value.clone())?);
            }
        }

        trace!(kind = %S::kind(), count = items.len(), "listed");

        Ok(K8List {
            api_version: S::api_version(),
            kind: format!("{}List", S::kind()),
            metadata: ListMetadata {
                _continue: None,
                resource_version: self.resource_version().to_string(),
            },
            items,
        })
    }

    fn retrieve_items_in_chunks<'a, S, N>(
        self: Arc<Self>,
        namespace: N,
        _limit: u32,
        option: Option<ListArg>,
    ) -> BoxStream<'a, K8List<S>>
    where
        S: Spec + 'static,
        N: Into<NameSpace> + Send + Sync + 'static,
    {
        let ft = async move {
            self.retrieve_items_with_option::<S, N>(namespace, option)
                .await
                .ok()
        };
        ft.into_stream()
            .filter_map(futures_util::future::ready)
            .boxed()
    }

    async fn delete_item_with_option<S, M>(
        &self,
        metadata: &M,
        _option: Option<DeleteOptions>,
    ) -> Result<DeleteStatus<S>>
    where
        S: Spec,
        M: K8Meta + Send + Sync,
    {
        let key = (metadata.namespace().to_owned(), metadata.name().to_owned());
        let store = self.store::<S>().await;
        let mut state = store.write().await;

        let Some(removed) = state.objects.remove(&key) else {
            return Err(ObjectKeyNotFound::new(key.1).into());
        };

        let version = self.next_version();
        state.record(version, WatchKind::Deleted, removed);

        Ok(DeleteStatus::Deleted(MetaStatus {
            api_version: S::api_version(),
            code: None,
            details: None,
            kind: S::kind(),
            reason: None,
            status: StatusEnum::SUCCESS,
            message: None,
        }))
    }

    async fn create_item<S>(&self, value: InputK8Obj<S>) -> Result<K8Obj<S>>
    where
        S: Spec,
    {
        let metadata = value.metadata;
        if metadata.name.is_empty() {
            return Err(api_error(
                STATUS_INVALID,
                "Invalid",
                "metadata.name: Required value",
            ));
        }
        let namespace = if S::NAME_SPACED {
            metadata.namespace.clone()
        } else {
            String::new()
        };
        let key = (namespace.clone(), metadata.name.clone());

        let store = self.store::<S>().await;
        let mut state = store.write().await;

        if state.objects.contains_key(&key) {
            return Err(api_error(
                STATUS_CONFLICT,
                "AlreadyExists",
                format!(
                    "{} \"{}\" already exists",
                    S::metadata().names.plural,
                    key.1
                ),
            ));
        }

        let version = self.next_version();
        let mut k8_obj: K8Obj<S> = K8Obj::new(metadata.name.clone(), value.spec);
        k8_obj.metadata = k8_types::ObjectMeta {
            name: metadata.name,
            namespace,
            owner_references: metadata.owner_references,
            labels: metadata.labels,
            annotations: metadata.annotations,
            finalizers: metadata.finalizers,
            resource_version: version.to_string(),
            uid: format!("{}-{version}", S::kind().to_lowercase()),
            ..Default::default()
        };

        let stored = serde_json::to_value(&k8_obj)?;
        state.objects.insert(key, stored.clone());
        state.record(version, WatchKind::Added, stored);
        debug!(kind = %S::kind(), name = %k8_obj.metadata.name, version, "created");

        Ok(k8_obj)
    }

    async fn update_status<S>(&self, value: &UpdateK8ObjStatus<S>) -> Result<K8Obj<S>>
    where
        S: Spec,
    {
        let key = (
            value.metadata.namespace.clone(),
            value.metadata.name.clone(),
        );
        let store = self.store::<S>().await;
        let mut state = store.write().await;

        let Some(current) = state.objects.get(&key) else {
            return Err(ObjectKeyNotFound::new(key.1).into());
        };

        let current: K8Obj<S> = serde_json::from_value(current.clone())?;
        let mut k8_obj = current.set_status(value.status.clone());
        let version = self.next_version();
        k8_obj.metadata.resource_version = version.to_string();

        let stored = serde_json::to_value(&k8_obj)?;
        state.objects.insert(key, stored.clone());
        state.record(version, WatchKind::Modified, stored);

        Ok(k8_obj)
    }

    async fn patch<S, M>(
        &self,
        metadata: &M,
        patch: &serde_json::Value,
        merge_type: PatchMergeType,
    ) -> Result<K8Obj<S>>
    where
        S: Spec,
        M: K8Meta + Display + Send + Sync,
    {
        self.apply_patch(metadata, patch, merge_type, "spec").await
    }

    async fn patch_status<S, M>(
        &self,
        metadata: &M,
        patch: &serde_json::Value,
        merge_type: PatchMergeType,
    ) -> Result<K8Obj<S>>
    where
        S: Spec,
        M: K8Meta + Display + Send + Sync,
    {
        self.apply_patch(metadata, patch, merge_type, "status").await
    }

    async fn patch_subresource<S, M>(
        &self,
        metadata: &M,
        subresource: String,
        patch: &serde_json::Value,
        merge_type: PatchMergeType,
    ) -> Result<K8Obj<S>>
    where
        S: Spec,
        M: K8Meta + Display + Send + Sync,
    {
        self.apply_patch(metadata, patch, merge_type, &subresource)
            .await
    }

    /// replays recorded events newer than `resource_version`, then follows live writes
    fn watch_stream_since<S, N>(
        &self,
        namespace: N,
        resource_version: Option<String>,
    ) -> BoxStream<'_, TokenStreamResult<S>>
    where
        S: Spec + 'static,
        S::Status: 'static,
        S::Header: 'static,
        N: Into<NameSpace>,
    {
        let namespace = namespace_filter(namespace.into());
        let since: u64 = resource_version
            .and_then(|version| version.parse().ok())
            .unwrap_or_default();

        let ft_stream = async move {
            let store = self.store::<S>().await;
            let mut state = store.write().await;

            let (sender, receiver) = unbounded();
            for record in state.history.iter().filter(|r| r.version > since) {
                let _ = sender.try_send(record.clone());
            }
            state.watchers.push(sender);
            drop(state);

            receiver
                .filter(move |record| {
                    let in_namespace = match &namespace {
                        Some(ns) => record.object["metadata"]["namespace"] == Value::String(ns.clone()),
                        None => true,
                    };
                    futures_util::future::ready(in_namespace)
                })
                .map(|record| Ok(vec![record.to_watch::<S>()]))
        };

        ft_stream.flatten_stream().boxed()
    }
}

#[cfg(test)]
mod test {
    use futures_util::StreamExt;
    use k8_types::InputObjectMeta;
    use serde_json::json;

    use kubedb_metadata::mongodb::MongoDBSpec;

    use super::*;
    use crate::error::StoreError;

    fn mongodb(name: &str, ns: &str) -> InputK8Obj<MongoDBSpec> {
        InputK8Obj::new(
            MongoDBSpec {
                version: "5.0.3".to_owned(),
                ..Default::default()
            },
            InputObjectMeta::named(name, ns),
        )
    }

    #[fluvio_future::test]
    async fn test_create_and_conflict() {
        let client = MemoryClient::new_shared();
        let created = client
            .create_item(mongodb("mg", "demo"))
            .await
            .expect("create");
        assert_eq!(created.metadata.resource_version, "1");
        assert_eq!(created.metadata.namespace, "demo");

        let err = client
            .create_item(mongodb("mg", "demo"))
            .await
            .expect_err("duplicate");
        assert!(StoreError::classify(err, "MongoDB", "demo/mg").is_conflict());

        // same name in another namespace is a different object
        client
            .create_item(mongodb("mg", "other"))
            .await
            .expect("create");
        assert_eq!(client.count::<MongoDBSpec>().await, 2);
    }

    #[fluvio_future::test]
    async fn test_list_with_field_selector() {
        let client = MemoryClient::new_shared();
        for (name, ns) in [("a", "demo"), ("b", "demo"), ("a", "prod")] {
            client.create_item(mongodb(name, ns)).await.expect("create");
        }

        let all = client
            .retrieve_items::<MongoDBSpec, _>(NameSpace::All)
            .await
            .expect("list");
        assert_eq!(all.items.len(), 3);
        assert_eq!(all.metadata.resource_version, "3");

        let demo = client
            .retrieve_items::<MongoDBSpec, _>("demo")
            .await
            .expect("list");
        assert_eq!(demo.items.len(), 2);

        let named = client
            .retrieve_items_with_option::<MongoDBSpec, _>(
                NameSpace::All,
                Some(ListArg {
                    field_selector: Some("metadata.name=a".to_owned()),
                    ..Default::default()
                }),
            )
            .await
            .expect("list");
        assert_eq!(named.items.len(), 2);

        let unsupported = client
            .retrieve_items_with_option::<MongoDBSpec, _>(
                NameSpace::All,
                Some(ListArg {
                    field_selector: Some("metadata.annotations.hello=world".to_owned()),
                    ..Default::default()
                }),
            )
            .await;
        assert!(unsupported.is_err());
    }

    #[fluvio_future::test]
    async fn test_patch_status_checks_version() {
        let client = MemoryClient::new_shared();
        let created = client
            .create_item(mongodb("mg", "demo"))
            .await
            .expect("create");
        let meta = created.metadata.as_input();

        let patched: K8Obj<MongoDBSpec> = client
            .patch_status(
                &meta,
                &json!({"metadata": {"resourceVersion": "1"}, "status": {"phase": "Ready"}}),
                PatchMergeType::JsonMerge,
            )
            .await
            .expect("patch");
        assert_eq!(patched.status.phase.as_deref(), Some("Ready"));
        assert_eq!(patched.metadata.resource_version, "2");
        // status patch leaves spec alone
        assert_eq!(patched.spec.version, "5.0.3");

        let stale = client
            .patch_status::<MongoDBSpec, _>(
                &meta,
                &json!({"metadata": {"resourceVersion": "1"}, "status": {"phase": "Halted"}}),
                PatchMergeType::JsonMerge,
            )
            .await
            .expect_err("stale");
        assert!(StoreError::classify(stale, "MongoDB", "demo/mg").is_conflict());
    }

    #[fluvio_future::test]
    async fn test_empty_store_rejects_unsupported_field() {
        let client = MemoryClient::new_shared();
        let err = client
            .retrieve_items_with_option::<MongoDBSpec, _>(
                NameSpace::All,
                Some(ListArg {
                    field_selector: Some("metadata.annotations.hello=world".to_owned()),
                    ..Default::default()
                }),
            )
            .await
            .expect_err("unsupported field");
        let status = err.downcast_ref::<MetaStatus>().expect("api status");
        assert_eq!(status.code, Some(STATUS_BAD_REQUEST));

        let empty = client
            .retrieve_items_with_option::<MongoDBSpec, _>(
                NameSpace::All,
                Some(ListArg {
                    field_selector: Some("metadata.namespace=demo".to_owned()),
                    ..Default::default()
                }),
            )
            .await
            .expect("list");
        assert!(empty.items.is_empty());
    }

    #[fluvio_future::test]
    async fn test_patch_subresource() {
        let client = MemoryClient::new_shared();
        let created = client
            .create_item(mongodb("mg", "demo"))
            .await
            .expect("create");
        let meta = created.metadata.as_input();

        let patched: K8Obj<MongoDBSpec> = client
            .patch_subresource(
                &meta,
                "status".to_owned(),
                &json!({"status": {"phase": "Provisioning"}}),
                PatchMergeType::JsonMerge,
            )
            .await
            .expect("patch");
        assert_eq!(patched.status.phase.as_deref(), Some("Provisioning"));
        assert_eq!(patched.spec.version, "5.0.3");

        let missing = client
            .patch_subresource::<MongoDBSpec, _>(
                &InputObjectMeta::named("none", "demo"),
                "status".to_owned(),
                &json!({"status": {"phase": "Ready"}}),
                PatchMergeType::JsonMerge,
            )
            .await
            .expect_err("missing");
        assert!(StoreError::classify(missing, "MongoDB", "demo/none").is_not_found());
    }

    #[fluvio_future::test]
    async fn test_watch_replays_and_follows() {
        let client = MemoryClient::new_shared();
        client.create_item(mongodb("a", "demo")).await.expect("create");
        client.create_item(mongodb("b", "demo")).await.expect("create");

        let mut stream = client.watch_stream_since::<MongoDBSpec, _>(NameSpace::All, Some("1".to_owned()));

        client
            .delete_item_with_option::<MongoDBSpec, _>(&InputObjectMeta::named("a", "demo"), None)
            .await
            .expect("delete");

        let first = stream.next().await.expect("event").expect("batch");
        assert!(matches!(first[0].as_ref().expect("watch"), K8Watch::ADDED(obj) if obj.metadata.name == "b"));

        let second = stream.next().await.expect("event").expect("batch");
        assert!(matches!(second[0].as_ref().expect("watch"), K8Watch::DELETED(obj) if obj.metadata.name == "a"));
    }
}
