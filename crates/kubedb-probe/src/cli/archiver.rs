use anyhow::Result;
use clap::Args;
use tracing::{error, info};

use k8_client::meta_client::MetadataClient;

use kubedb_metadata::mongodb::MongoDBSpec;

use crate::archiver::build_archiver;
use crate::projection::{error_chain, for_each_listed, IdentityProjector};

use super::{ProbeContext, Terminal};

#[derive(Debug, Args)]
pub struct ArchiverOpt {
    /// Volume snapshot class the archiver backs up with
    #[arg(default_value = "az-vsc")]
    pub service: String,

    /// Print the archiver as YAML instead of creating it
    #[arg(long)]
    pub dry_run: bool,
}

impl ArchiverOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient,
        O: Terminal,
    {
        let items = ctx
            .store()
            .list::<MongoDBSpec, _>(ctx.namespace(), None)
            .await?;
        let report = for_each_listed(&items, &IdentityProjector);
        for line in report.projected {
            out.println(&line);
        }
        out.println("Done");

        let archiver = build_archiver(&self.service);
        if self.dry_run {
            out.println(serde_yaml::to_string(&archiver)?.trim_end());
            return Ok(());
        }

        // an existing archiver is reported, not fatal
        match ctx.store().create(archiver).await {
            Ok(created) => {
                info!(
                    name = %created.metadata.name,
                    namespace = %created.metadata.namespace,
                    "archiver created"
                );
                out.println(&format!(
                    "{}/{} created",
                    created.metadata.namespace, created.metadata.name
                ));
            }
            Err(err) => error!(error = %error_chain(&err), "cannot create archiver"),
        }
        Ok(())
    }
}
