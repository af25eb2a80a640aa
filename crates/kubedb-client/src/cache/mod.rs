//!
//! # Field indexed cache
//!
//! Local copy of one kind, kept current by a background dispatcher, with
//! secondary indexes over arbitrary fields. The api server cannot select on
//! annotations; this cache can, once registered extractors have indexed them.
//!
//! Usage is two-phase: `start` spawns the dispatcher and hands back a
//! `CacheReady`, whose `wait` resolves after the first full listing.
//!
mod dispatcher;
mod latch;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_lock::RwLock;
use k8_client::meta_client::{MetadataClient, NameSpace};
use k8_types::{K8Obj, Spec};
use tokio::select;
use tracing::{debug, trace};

use fluvio_future::timer::sleep;

use crate::selector::{FieldOperator, FieldSelector};

pub use self::latch::Latch;
use self::dispatcher::CacheDispatcher;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("index already registered: {0}")]
    DuplicateIndex(String),
    #[error("no index registered for field: {0}")]
    IndexNotFound(String),
    #[error("only equality is supported by the cache, got: {0}")]
    UnsupportedOperator(String),
    #[error("cache not synced after {}", humantime::format_duration(*.0))]
    SyncTimeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn of<S: Spec>(obj: &K8Obj<S>) -> Self {
        Self {
            namespace: obj.metadata.namespace.clone(),
            name: obj.metadata.name.clone(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

pub type IndexFn<S> = Box<dyn Fn(&K8Obj<S>) -> Vec<String> + Send + Sync>;

struct Indexer<S: Spec> {
    field: String,
    extract: IndexFn<S>,
}

/// index name -> value -> keys
type FieldIndex = HashMap<String, HashMap<String, BTreeSet<ObjectKey>>>;

pub(crate) struct CacheState<S: Spec> {
    objects: BTreeMap<ObjectKey, K8Obj<S>>,
    indexes: FieldIndex,
    synced: bool,
}

impl<S: Spec> CacheState<S> {
    fn new(indexers: &[Indexer<S>]) -> Self {
        Self {
            objects: BTreeMap::new(),
            indexes: indexers
                .iter()
                .map(|indexer| (indexer.field.clone(), HashMap::new()))
                .collect(),
            synced: false,
        }
    }

    fn unindex(&mut self, key: &ObjectKey) {
        for values in self.indexes.values_mut() {
            values.retain(|_, keys| {
                keys.remove(key);
                !keys.is_empty()
            });
        }
    }

    fn upsert(&mut self, indexers: &[Indexer<S>], obj: K8Obj<S>) {
        let key = ObjectKey::of(&obj);
        self.unindex(&key);
        for indexer in indexers {
            let values = (indexer.extract)(&obj);
            if let Some(index) = self.indexes.get_mut(&indexer.field) {
                for value in values {
                    index.entry(value).or_default().insert(key.clone());
                }
            }
        }
        self.objects.insert(key, obj);
    }

    fn remove(&mut self, key: &ObjectKey) {
        self.unindex(key);
        self.objects.remove(key);
    }

    /// replace everything with a fresh listing
    fn sync_all(&mut self, indexers: &[Indexer<S>], items: Vec<K8Obj<S>>) {
        self.objects.clear();
        for values in self.indexes.values_mut() {
            values.clear();
        }
        for obj in items {
            self.upsert(indexers, obj);
        }
        self.synced = true;
    }
}

pub(crate) struct CacheShared<S: Spec> {
    state: RwLock<CacheState<S>>,
    indexers: Vec<Indexer<S>>,
    ready: Arc<Latch>,
    shutdown: Arc<Latch>,
}

pub struct IndexedCacheBuilder<S: Spec, C> {
    client: Arc<C>,
    namespace: Option<String>,
    indexers: Vec<Indexer<S>>,
}

impl<S, C> IndexedCacheBuilder<S, C>
where
    S: Spec + 'static,
    S::Status: 'static,
    S::Header: 'static,
    C: MetadataClient + 'static,
{
    /// register an extractor; each returned value indexes the object under `field`
    pub fn index_field<F>(mut self, field: impl Into<String>, extract: F) -> Result<Self, CacheError>
    where
        F: Fn(&K8Obj<S>) -> Vec<String> + Send + Sync + 'static,
    {
        let field = field.into();
        if self.indexers.iter().any(|indexer| indexer.field == field) {
            return Err(CacheError::DuplicateIndex(field));
        }
        debug!(%field, kind = %S::kind(), "index registered");
        self.indexers.push(Indexer {
            field,
            extract: Box::new(extract),
        });
        Ok(self)
    }

    /// spawn the dispatcher; the returned handle resolves on first sync
    pub fn start(self) -> (IndexedCache<S>, CacheReady) {
        let shared = Arc::new(CacheShared {
            state: RwLock::new(CacheState::new(&self.indexers)),
            indexers: self.indexers,
            ready: Latch::new_shared(),
            shutdown: Latch::new_shared(),
        });

        let namespace = match self.namespace {
            Some(ns) => NameSpace::Named(ns),
            None => NameSpace::All,
        };
        CacheDispatcher::start(self.client, namespace, shared.clone());

        let ready = CacheReady {
            latch: shared.ready.clone(),
        };
        (IndexedCache { shared }, ready)
    }
}

/// Rendezvous with the first completed sync of a cache
#[derive(Debug, Clone)]
pub struct CacheReady {
    latch: Arc<Latch>,
}

impl CacheReady {
    pub fn is_ready(&self) -> bool {
        self.latch.is_open()
    }

    pub async fn wait(&self, timeout: Duration) -> Result<(), CacheError> {
        select! {
            _ = self.latch.wait() => {
                debug!("cache synced");
                Ok(())
            },
            _ = sleep(timeout) => Err(CacheError::SyncTimeout(timeout)),
        }
    }
}

pub struct IndexedCache<S: Spec> {
    shared: Arc<CacheShared<S>>,
}

impl<S: Spec> Clone for IndexedCache<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> IndexedCache<S>
where
    S: Spec + 'static,
    S::Status: 'static,
    S::Header: 'static,
{
    /// `namespace` of `None` caches every namespace
    pub fn builder<C>(client: Arc<C>, namespace: Option<String>) -> IndexedCacheBuilder<S, C>
    where
        C: MetadataClient + 'static,
    {
        IndexedCacheBuilder {
            client,
            namespace,
            indexers: vec![],
        }
    }

    pub async fn is_synced(&self) -> bool {
        self.shared.state.read().await.synced
    }

    pub async fn len(&self) -> usize {
        self.shared.state.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, namespace: &str, name: &str) -> Option<K8Obj<S>> {
        let key = ObjectKey {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        };
        self.shared.state.read().await.objects.get(&key).cloned()
    }

    /// Objects satisfying every equality requirement of `selector`, ordered by key.
    /// Returns nothing until the first sync has completed.
    pub async fn list_matching(&self, selector: &FieldSelector) -> Result<Vec<K8Obj<S>>, CacheError> {
        for requirement in selector.requirements() {
            if requirement.operator != FieldOperator::Equals {
                return Err(CacheError::UnsupportedOperator(requirement.to_string()));
            }
            if !self
                .shared
                .indexers
                .iter()
                .any(|indexer| indexer.field == requirement.field)
            {
                return Err(CacheError::IndexNotFound(requirement.field.clone()));
            }
        }

        let state = self.shared.state.read().await;
        if !state.synced {
            trace!("cache not synced yet");
            return Ok(vec![]);
        }

        let mut matched: Option<BTreeSet<ObjectKey>> = None;
        for requirement in selector.requirements() {
            let keys = state
                .indexes
                .get(&requirement.field)
                .and_then(|values| values.get(&requirement.value))
                .cloned()
                .unwrap_or_default();
            matched = Some(match matched {
                Some(previous) => previous.intersection(&keys).cloned().collect(),
                None => keys,
            });
        }

        let objects = match matched {
            Some(keys) => keys
                .iter()
                .filter_map(|key| state.objects.get(key).cloned())
                .collect(),
            None => state.objects.values().cloned().collect(),
        };
        Ok(objects)
    }

    /// ask the dispatcher to exit at its next wake-up
    pub fn stop(&self) {
        debug!(kind = %S::kind(), "stopping cache");
        self.shared.shutdown.open();
    }
}

/// extractor for `metadata.annotations.<name>`
pub fn annotation_extractor<S: Spec>(name: impl Into<String>) -> impl Fn(&K8Obj<S>) -> Vec<String> + Send + Sync + 'static {
    let name = name.into();
    move |obj| {
        obj.metadata
            .annotations
            .get(&name)
            .map(|value| vec![value.clone()])
            .unwrap_or_default()
    }
}
