//!
//! # Command line
//!
//! Every command is generic over the metadata client so it runs the same
//! against a live cluster and against the in-memory store used in tests.
//!
mod archiver;
mod deployments;
mod mongodb;
mod pods;

use anyhow::Result;
use clap::{Args, Parser};
use tracing::debug;

use k8_client::meta_client::{MetadataClient, NameSpace};

use kubedb_client::scheme::default_scheme;
use kubedb_client::{connect, resolve_connection, StoreClient};

pub use self::archiver::ArchiverOpt;
pub use self::deployments::DeploymentsOpt;
pub use self::mongodb::{
    CreateOrPatchOpt, IndexedOpt, ListOpt, MongoDbCmd, PatchStatusOpt, ResourcesOpt,
};
pub use self::pods::PodsOpt;

/// namespace for commands that write when none was given
pub const DEFAULT_NAMESPACE: &str = "default";

/// Sink for the plain text results of a command
pub trait Terminal {
    fn println(&self, msg: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PrintTerminal;

impl Terminal for PrintTerminal {
    fn println(&self, msg: &str) {
        println!("{msg}");
    }
}

#[derive(Debug, Args, Clone, Default)]
pub struct GlobalOptions {
    /// Namespace to operate in, all namespaces when omitted
    #[arg(short = 'n', long, global = true, env = "KUBEDB_PROBE_NAMESPACE")]
    pub namespace: Option<String>,
}

#[derive(Debug, Parser)]
#[command(
    name = "kubedb-probe",
    about = "Probe a cluster for KubeDB resources",
    max_term_width = 100,
    disable_version_flag = true
)]
pub struct Root {
    #[command(flatten)]
    pub opts: GlobalOptions,
    #[command(subcommand)]
    pub command: Command,
}

impl Root {
    /// connect to the cluster from the kubeconfig and run the command
    pub async fn process(self) -> Result<()> {
        let config = resolve_connection()?;
        let client = connect(config)?;
        let scheme = default_scheme()?;
        debug!(types = scheme.len(), "connected");

        let ctx = ProbeContext::new(StoreClient::new(client, scheme), self.opts.namespace);
        self.command.process(&ctx, &PrintTerminal).await
    }
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Count the pods in the cluster
    Pods(PodsOpt),

    /// MongoDB operations
    #[command(subcommand)]
    Mongodb(MongoDbCmd),

    /// List deployments by name with a server side field selector
    Deployments(DeploymentsOpt),

    /// List MongoDBs, then create the sample MongoDB archiver
    Archiver(ArchiverOpt),
}

impl Command {
    pub async fn process<C, O>(self, ctx: &ProbeContext<C>, out: &O) -> Result<()>
    where
        C: MetadataClient + 'static,
        O: Terminal,
    {
        match self {
            Self::Pods(opt) => opt.process(ctx, out).await,
            Self::Mongodb(cmd) => cmd.process(ctx, out).await,
            Self::Deployments(opt) => opt.process(ctx, out).await,
            Self::Archiver(opt) => opt.process(ctx, out).await,
        }
    }
}

/// What every command needs: the typed store and the selected namespace
pub struct ProbeContext<C> {
    store: StoreClient<C>,
    namespace: Option<String>,
}

impl<C> ProbeContext<C>
where
    C: MetadataClient,
{
    pub fn new(store: StoreClient<C>, namespace: Option<String>) -> Self {
        Self { store, namespace }
    }

    pub fn store(&self) -> &StoreClient<C> {
        &self.store
    }

    /// scope for listing
    pub fn namespace(&self) -> NameSpace {
        match &self.namespace {
            Some(ns) => NameSpace::Named(ns.clone()),
            None => NameSpace::All,
        }
    }

    /// scope for a single object
    pub fn target_namespace(&self) -> String {
        self.namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned())
    }

    pub fn selected_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}
