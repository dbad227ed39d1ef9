use clap::Parser;
use fixtures::{run_server, FixtureArgs, MockObjectStore};

/// Path-style object store fixture server
#[derive(Parser, Debug)]
#[clap(name = "object-store-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,

    /// Answer every PUT with 503
    #[arg(long)]
    failing: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let store = MockObjectStore::new();
    store.set_failing(args.failing);

    run_server(args.common, store.router()).await
}
