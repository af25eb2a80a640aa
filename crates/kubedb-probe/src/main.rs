use clap::Parser;
use tracing::error;

use fluvio_future::task::run_block_on;

use kubedb_probe::projection::error_chain;
use kubedb_probe::Root;

fn main() {
    fluvio_future::subscriber::init_tracer(None);

    let root = Root::parse();
    if let Err(err) = run_block_on(root.process()) {
        error!(error = %error_chain(err.as_ref()), "command failed");
        std::process::exit(1);
    }
}
