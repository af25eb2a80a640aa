use anyhow::Result;
use clap::Args;

use k8_client::meta_client::MetadataClient;
use k8_types::app::deployment::DeploymentSpec;

use kubedb_client::selector::FIELD_NAME;
use kubedb_client::FieldSelector;

use crate::projection::{for_each_listed, IdentityProjector};

use super::{ProbeContext, Terminal};

#[derive(Debug, Args)]
pub struct DeploymentsOpt {
    /// Deployment name, matched by the API server
    #[arg(long, default_value = "helm-controller")]
    pub name: String,
}

impl DeploymentsOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient,
        O: Terminal,
    {
        let selector = FieldSelector::equals(FIELD_NAME, &self.name);
        let deployments = ctx
            .store()
            .list::<DeploymentSpec, _>(ctx.namespace(), Some(&selector))
            .await?;

        let report = for_each_listed(&deployments, &IdentityProjector);
        for line in report.projected {
            out.println(&line);
        }
        out.println("Done");
        Ok(())
    }
}
