use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::{debug, info};

use k8_client::meta_client::MetadataClient;
use k8_types::InputObjectMeta;

use kubedb_client::cache::{annotation_extractor, IndexedCache};
use kubedb_client::FieldSelector;
use kubedb_metadata::api::Condition;
use kubedb_metadata::mongodb::MongoDBSpec;

use crate::projection::{for_each_listed, IdentityProjector, ResourceRequestProjector};
use crate::resource_metrics::CalculatorRegistry;

use super::{ProbeContext, Terminal};

#[derive(Debug, Subcommand)]
pub enum MongoDbCmd {
    /// List MongoDBs as namespace/name
    List(ListOpt),

    /// Query MongoDBs by annotation through a synced local index
    Indexed(IndexedOpt),

    /// Estimate the resources requested by each MongoDB
    Resources(ResourcesOpt),

    /// Create a MongoDB, or patch its spec if it exists
    CreateOrPatch(CreateOrPatchOpt),

    /// Set a condition on the status of a MongoDB
    PatchStatus(PatchStatusOpt),
}

impl MongoDbCmd {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient + 'static,
        O: Terminal,
    {
        match self {
            Self::List(opt) => opt.process(ctx, out).await,
            Self::Indexed(opt) => opt.process(ctx, out).await,
            Self::Resources(opt) => opt.process(ctx, out).await,
            Self::CreateOrPatch(opt) => opt.process(ctx, out).await,
            Self::PatchStatus(opt) => opt.process(ctx, out).await,
        }
    }
}

#[derive(Debug, Args)]
pub struct ListOpt {
    /// Server side field selector, such as `metadata.name=mg`
    #[arg(long)]
    pub field_selector: Option<FieldSelector>,
}

impl ListOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient,
        O: Terminal,
    {
        let items = ctx
            .store()
            .list::<MongoDBSpec, _>(ctx.namespace(), self.field_selector.as_ref())
            .await?;

        let report = for_each_listed(&items, &IdentityProjector);
        for line in report.projected {
            out.println(&line);
        }
        out.println("Done");
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct IndexedOpt {
    /// Annotation to index
    #[arg(long, default_value = "hello")]
    pub annotation: String,

    /// Annotation value to look up
    #[arg(long, default_value = "world")]
    pub value: String,

    /// How long to wait for the first full sync, such as `30s` or `2m`
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub sync_timeout: Duration,
}

impl IndexedOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient + 'static,
        O: Terminal,
    {
        let field = format!("metadata.annotations.{}", self.annotation);
        let (cache, ready) = IndexedCache::<MongoDBSpec>::builder(
            ctx.store().client().clone(),
            ctx.selected_namespace().map(str::to_owned),
        )
        .index_field(field.clone(), annotation_extractor(self.annotation.clone()))?
        .start();

        let matched = match ready.wait(self.sync_timeout).await {
            Ok(()) => {
                cache
                    .list_matching(&FieldSelector::equals(field, self.value))
                    .await
            }
            Err(err) => Err(err),
        };
        cache.stop();
        let items = matched?;
        debug!(count = items.len(), "indexed lookup");

        let report = for_each_listed(&items, &IdentityProjector);
        for line in report.projected {
            out.println(&line);
        }
        out.println("Done");
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ResourcesOpt {}

impl ResourcesOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient,
        O: Terminal,
    {
        let items = ctx
            .store()
            .list::<MongoDBSpec, _>(ctx.namespace(), None)
            .await?;

        let projector = ResourceRequestProjector::new(
            ctx.store().scheme().clone(),
            Arc::new(CalculatorRegistry::with_defaults()),
        );
        let report = for_each_listed(&items, &projector);
        for line in report.projected {
            out.println(&line);
        }
        if report.failed > 0 {
            info!(failed = report.failed, "some objects were skipped");
            out.println(&format!("{} skipped", report.failed));
        }
        out.println("Done");
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct CreateOrPatchOpt {
    #[arg(long, default_value = "mg")]
    pub name: String,

    /// MongoDB version to run
    #[arg(long, default_value = "5.0.3")]
    pub version: String,

    #[arg(long, default_value_t = 1)]
    pub replicas: i32,
}

impl CreateOrPatchOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient,
        O: Terminal,
    {
        let namespace = ctx.target_namespace();
        let meta = InputObjectMeta::named(self.name.clone(), namespace.clone());
        let Self {
            version, replicas, ..
        } = self;

        let (obj, verb) = ctx
            .store()
            .create_or_patch::<MongoDBSpec, _>(&meta, move |spec, _| {
                spec.version = version;
                spec.replicas = Some(replicas);
            })
            .await?;

        info!(
            name = %obj.metadata.name,
            %namespace,
            %verb,
            resource_version = %obj.metadata.resource_version,
            "mongodb applied"
        );
        out.println(&format!(
            "{}/{} {}",
            obj.metadata.namespace, obj.metadata.name, verb
        ));
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PatchStatusOpt {
    #[arg(long, default_value = "mg")]
    pub name: String,

    /// Condition type to set
    #[arg(long = "type", default_value = "aaaa")]
    pub condition_type: String,

    #[arg(long, default_value = "aaa")]
    pub status: String,

    #[arg(long, default_value = "aa")]
    pub reason: String,

    #[arg(long, default_value = "a")]
    pub message: String,

    /// Extra attempts after a resource version conflict
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

impl PatchStatusOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient,
        O: Terminal,
    {
        let meta = InputObjectMeta::named(self.name.clone(), ctx.target_namespace());
        let condition = Condition::new(self.condition_type, self.status)
            .with_reason(self.reason)
            .with_message(self.message);

        let attempts = self.retries.saturating_add(1);
        let obj = ctx
            .store()
            .patch_status_with_retry::<MongoDBSpec, _>(&meta, attempts, |status| {
                status.set_condition(condition.clone());
            })
            .await?;

        out.println(&format!(
            "{}/{} condition {}={}",
            obj.metadata.namespace,
            obj.metadata.name,
            condition.condition_type,
            condition.status
        ));
        Ok(())
    }
}
