use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use arcanum_core::config::{load_dotenv, ServerArgs};
use arcanum_core::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = ServerArgs::parse();
    init_tracing(args.log_json)?;
    run_server(args).await
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
