use anyhow::Result;
use clap::Args;

use k8_client::meta_client::MetadataClient;
use k8_types::core::pod::PodSpec;

use super::{ProbeContext, Terminal};

#[derive(Debug, Args)]
pub struct PodsOpt {}

impl PodsOpt {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient,
        O: Terminal,
    {
        let pods = ctx.store().list::<PodSpec, _>(ctx.namespace(), None).await?;
        out.println(&format!("There are {} pods in the cluster", pods.len()));
        Ok(())
    }
}
