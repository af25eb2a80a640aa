use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use k8_client::meta_client::{MetadataClient, NameSpace, TokenStreamResult};
use k8_types::{K8Watch, Spec};
use tokio::select;
use tracing::{debug, error, info, trace};

use fluvio_future::task::spawn;
use fluvio_future::timer::sleep;

use super::{CacheShared, ObjectKey};

const RELIST_BACKOFF: Duration = Duration::from_secs(1);

/// Keeps one cache current: full listing, then watch from the listed version.
/// When the watch ends, it lists again.
pub(crate) struct CacheDispatcher<S: Spec, C> {
    client: Arc<C>,
    namespace: NameSpace,
    shared: Arc<CacheShared<S>>,
}

impl<S, C> CacheDispatcher<S, C>
where
    S: Spec + 'static,
    S::Status: 'static,
    S::Header: 'static,
    C: MetadataClient + 'static,
{
    pub(crate) fn start(client: Arc<C>, namespace: NameSpace, shared: Arc<CacheShared<S>>) {
        let dispatcher = Self {
            client,
            namespace,
            shared,
        };

        spawn(dispatcher.outer_loop());
    }

    async fn outer_loop(self) {
        info!(kind = %S::kind(), "starting cache dispatcher");
        while !self.shared.shutdown.is_open() {
            debug!(kind = %S::kind(), "starting inner loop");
            self.inner_loop().await;
        }
        info!(kind = %S::kind(), "cache dispatcher stopped");
    }

    async fn inner_loop(&self) {
        let resume_version = match self.sync_all().await {
            Ok(version) => version,
            Err(err) => {
                error!(kind = %S::kind(), %err, "cannot list objects");
                select! {
                    _ = sleep(RELIST_BACKOFF) => {},
                    _ = self.shared.shutdown.wait() => {},
                }
                return;
            }
        };

        let mut watch_stream = self
            .client
            .watch_stream_since::<S, _>(self.namespace.clone(), Some(resume_version));

        loop {
            trace!(kind = %S::kind(), "waiting for watch events");

            select! {
                _ = self.shared.shutdown.wait() => {
                    debug!("shutdown requested");
                    return;
                },

                next = watch_stream.next() => {
                    match next {
                        Some(events) => self.apply_watch_events(events).await,
                        None => {
                            debug!(kind = %S::kind(), "watch stream ended, relisting");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// replace the cache with a full listing and mark it synced
    async fn sync_all(&self) -> anyhow::Result<String> {
        let list = self
            .client
            .retrieve_items::<S, _>(self.namespace.clone())
            .await?;

        let version = list.metadata.resource_version.clone();
        debug!(kind = %S::kind(), count = list.items.len(), %version, "listed");

        let mut state = self.shared.state.write().await;
        state.sync_all(&self.shared.indexers, list.items);
        drop(state);

        self.shared.ready.open();
        Ok(version)
    }

    async fn apply_watch_events(&self, events: TokenStreamResult<S>) {
        let events = match events {
            Ok(events) => events,
            Err(err) => {
                error!(kind = %S::kind(), %err, "watch error");
                return;
            }
        };

        let mut state = self.shared.state.write().await;
        for event in events {
            match event {
                Ok(K8Watch::ADDED(obj)) | Ok(K8Watch::MODIFIED(obj)) => {
                    trace!(key = %ObjectKey::of(&obj), "upsert");
                    state.upsert(&self.shared.indexers, obj);
                }
                Ok(K8Watch::DELETED(obj)) => {
                    let key = ObjectKey::of(&obj);
                    trace!(%key, "delete");
                    state.remove(&key);
                }
                Err(err) => error!(kind = %S::kind(), %err, "problem parsing watch event"),
            }
        }
    }
}
