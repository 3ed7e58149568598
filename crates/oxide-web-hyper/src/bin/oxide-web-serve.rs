//! oxide-web-serve CLI
//!
//! Serves a directory of static files.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_web::{DirectoryResources, Router, Server, ServerSettings};
use oxide_web_hyper::HyperPort;

/// Serve static files over HTTP.
#[derive(Parser)]
#[command(name = "oxide-web-serve")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind.
    #[arg(short, long, env = "OXIDE_WEB_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on (0 picks a free one).
    #[arg(short, long, env = "OXIDE_WEB_PORT", default_value_t = 2010)]
    port: u16,

    /// Prefix applied to every route.
    #[arg(short, long, env = "OXIDE_WEB_CONTEXT_PATH", default_value = "")]
    context_path: String,

    /// Directory to serve.
    #[arg(short, long, env = "OXIDE_WEB_DIR", default_value = ".")]
    dir: PathBuf,

    /// Path the directory is served under.
    #[arg(short, long, env = "OXIDE_WEB_MOUNT", default_value = "/")]
    mount: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !cli.dir.is_dir() {
        anyhow::bail!("{} is not a directory", cli.dir.display());
    }

    let router = Router::new()
        .mount(
            &cli.mount,
            Router::new().resources("/*", DirectoryResources::new(&cli.dir)),
        )
        .after_all(|call| {
            Box::pin(async move {
                info!(
                    method = %call.request.method,
                    path = %call.request.path,
                    status = call.response.status,
                    "served"
                );
                Ok(())
            })
        });

    let settings = ServerSettings {
        bind_address: cli.bind,
        bind_port: cli.port,
        context_path: cli.context_path,
        ..ServerSettings::default()
    };
    let server = Server::new(HyperPort::new(), router, settings)?;
    server.start().await?;
    info!(
        dir = %cli.dir.display(),
        port = ?server.runtime_port(),
        "press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}
