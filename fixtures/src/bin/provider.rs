use clap::Parser;
use fixtures::{run_server, FixtureArgs, MockProvider};

/// OAuth2 provider fixture server
#[derive(Parser, Debug)]
#[clap(name = "provider-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,

    /// User id returned for every authorization
    #[arg(long, default_value = "FIXTURE1")]
    user_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let provider = MockProvider::new(&args.user_id);

    run_server(args.common, provider.router()).await
}
