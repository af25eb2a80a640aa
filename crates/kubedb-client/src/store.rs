//!
//! # Typed store client
//!
//! Registry checked access to a `MetadataClient`. Writes are expressed as
//! mutators over the typed spec or status, and submitted as json merge patches
//! guarded by the resource version the mutator saw.
//!
use std::fmt;
use std::sync::Arc;

use k8_client::meta_client::{ListArg, MetadataClient, NameSpace, PatchMergeType};
use k8_types::{InputK8Obj, InputObjectMeta, K8Obj, Spec};
use serde_json::json;
use tracing::{debug, instrument, trace};

use crate::error::StoreError;
use crate::merge_patch;
use crate::scheme::{Scheme, TypeKey};
use crate::selector::FieldSelector;

/// what `create_or_patch` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Created,
    Patched,
    Unchanged,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let verb = match self {
            Self::Created => "created",
            Self::Patched => "patched",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{verb}")
    }
}

fn object_key(meta: &InputObjectMeta) -> String {
    if meta.namespace.is_empty() {
        meta.name.clone()
    } else {
        format!("{}/{}", meta.namespace, meta.name)
    }
}

pub struct StoreClient<C> {
    client: Arc<C>,
    scheme: Arc<Scheme>,
}

impl<C> Clone for StoreClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            scheme: self.scheme.clone(),
        }
    }
}

impl<C> StoreClient<C>
where
    C: MetadataClient,
{
    pub fn new(client: Arc<C>, scheme: Arc<Scheme>) -> Self {
        Self { client, scheme }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn ensure_registered<S: Spec>(&self) -> Result<(), StoreError> {
        if self.scheme.is_registered::<S>() {
            Ok(())
        } else {
            Err(StoreError::NotRegistered(TypeKey::of::<S>()))
        }
    }

    /// list objects, optionally narrowed by a server side field selector
    #[instrument(skip_all, fields(kind = %S::kind(), selector = tracing::field::Empty))]
    pub async fn list<S, N>(
        &self,
        namespace: N,
        selector: Option<&FieldSelector>,
    ) -> Result<Vec<K8Obj<S>>, StoreError>
    where
        S: Spec,
        N: Into<NameSpace> + Send + Sync,
    {
        self.ensure_registered::<S>()?;

        let option = selector.filter(|s| !s.is_empty()).map(|s| {
            tracing::Span::current().record("selector", tracing::field::display(s));
            ListArg {
                field_selector: Some(s.to_string()),
                ..Default::default()
            }
        });

        let list = self
            .client
            .retrieve_items_with_option::<S, N>(namespace, option)
            .await
            .map_err(|err| StoreError::classify(err, &S::kind(), "*"))?;

        debug!(count = list.items.len(), "listed");
        Ok(list.items)
    }

    #[instrument(skip_all, fields(kind = %S::kind(), key = %object_key(meta)))]
    pub async fn get<S>(&self, meta: &InputObjectMeta) -> Result<Option<K8Obj<S>>, StoreError>
    where
        S: Spec,
    {
        self.ensure_registered::<S>()?;

        match self.client.retrieve_item::<S, _>(meta).await {
            Ok(item) => Ok(item),
            Err(err) => match StoreError::classify(err, &S::kind(), &object_key(meta)) {
                StoreError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    /// create a new object; an existing object with the same key is a conflict
    #[instrument(skip_all, fields(kind = %S::kind(), key = %object_key(&obj.metadata)))]
    pub async fn create<S>(&self, obj: InputK8Obj<S>) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
    {
        self.ensure_registered::<S>()?;

        let key = object_key(&obj.metadata);
        let created = self
            .client
            .create_item(obj)
            .await
            .map_err(|err| StoreError::classify(err, &S::kind(), &key))?;

        debug!(resource_version = %created.metadata.resource_version, "created");
        Ok(created)
    }

    /// Apply `mutator` to the current status and submit the difference.
    /// Fails with `NotFound` if the object does not exist and with `Conflict`
    /// if it changed after it was fetched. No request is sent when the
    /// mutator leaves the status untouched.
    #[instrument(skip_all, fields(kind = %S::kind(), key = %object_key(meta)))]
    pub async fn patch_status<S, F>(
        &self,
        meta: &InputObjectMeta,
        mutator: F,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
        F: FnOnce(&mut S::Status) + Send,
    {
        let current = self
            .get::<S>(meta)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: S::kind(),
                key: object_key(meta),
            })?;

        let mut status = current.status.clone();
        mutator(&mut status);

        let old = serde_json::to_value(&current.status)?;
        let new = serde_json::to_value(&status)?;
        let Some(diff) = merge_patch::diff(&old, &new) else {
            debug!("status unchanged, skipping patch");
            return Ok(current);
        };

        let patch = json!({
            "metadata": { "resourceVersion": current.metadata.resource_version },
            "status": diff,
        });
        trace!(%patch, "patching status");

        self.client
            .patch_status::<S, _>(
                &current.metadata.as_input(),
                &patch,
                PatchMergeType::JsonMerge,
            )
            .await
            .map_err(|err| StoreError::classify(err, &S::kind(), &object_key(meta)))
    }

    /// `patch_status` that refetches and reapplies `mutator` on conflict,
    /// at most `attempts` times in total
    pub async fn patch_status_with_retry<S, F>(
        &self,
        meta: &InputObjectMeta,
        attempts: u32,
        mut mutator: F,
    ) -> Result<K8Obj<S>, StoreError>
    where
        S: Spec,
        F: FnMut(&mut S::Status) + Send,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.patch_status::<S, _>(meta, &mut mutator).await {
                Err(err) if err.is_conflict() && attempt < attempts => {
                    debug!(attempt, %err, "status patch conflict, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Fetch the object and apply `mutator` to its spec. A missing object is
    /// created from `S::default()`; the mutator is told which case applies.
    #[instrument(skip_all, fields(kind = %S::kind(), key = %object_key(meta)))]
    pub async fn create_or_patch<S, F>(
        &self,
        meta: &InputObjectMeta,
        mutator: F,
    ) -> Result<(K8Obj<S>, Verb), StoreError>
    where
        S: Spec,
        F: FnOnce(&mut S, bool) + Send,
    {
        let Some(current) = self.get::<S>(meta).await? else {
            let mut spec = S::default();
            mutator(&mut spec, true);
            let created = self.create(InputK8Obj::new(spec, meta.clone())).await?;
            return Ok((created, Verb::Created));
        };

        let mut spec = current.spec.clone();
        mutator(&mut spec, false);

        let old = serde_json::to_value(&current.spec)?;
        let new = serde_json::to_value(&spec)?;
        let Some(diff) = merge_patch::diff(&old, &new) else {
            return Ok((current, Verb::Unchanged));
        };

        let patch = json!({
            "metadata": { "resourceVersion": current.metadata.resource_version },
            "spec": diff,
        });
        trace!(%patch, "patching spec");

        let patched = self
            .client
            .patch::<S, _>(
                &current.metadata.as_input(),
                &patch,
                PatchMergeType::JsonMerge,
            )
            .await
            .map_err(|err| StoreError::classify(err, &S::kind(), &object_key(meta)))?;

        Ok((patched, Verb::Patched))
    }
}
