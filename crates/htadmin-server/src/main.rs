use clap::Parser;
use htadmin::HtpasswdFile;
use snafu::{ResultExt, whatever};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod logging;
mod router;

use config::AdminCredentials;
use router::{AppState, setup_router};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Admin HTTP service for an htpasswd file.
#[derive(Parser)]
#[command(name = "htadmin-server")]
#[command(version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: (),

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:19978")]
    listen: SocketAddr,

    /// Path to the managed htpasswd file
    #[arg(long, default_value = ".htpasswd")]
    htpasswd: PathBuf,

    /// YAML file with the admin users allowed to call the API
    #[arg(long, default_value = "creds.yaml")]
    credentials: PathBuf,

    /// File that receives JSON logs
    #[arg(long, default_value = "htadmin.log")]
    log_file: PathBuf,

    /// Discard logs instead of writing the log file
    #[arg(long)]
    no_log: bool,
}

type Result<T> = ::std::result::Result<T, snafu::Whatever>;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "can't listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "can't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_whatever_context(|_| format!("Can't listen on {addr}"))?;
    tracing::info!(%addr, "htadmin server listening");
    println!("INFO: listening on {addr}");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let app = setup_router(state);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        finished = &mut server => {
            return match finished {
                Ok(result) => result.whatever_context("Server failed"),
                Err(e) => whatever!("Server task failed: {e}"),
            };
        }
        () = shutdown_signal() => {}
    }

    tracing::info!("Shutting down server...");
    println!("INFO: Shutting down server ...");
    let _ = stop_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(result)) => result.whatever_context("Server failed during shutdown")?,
        Ok(Err(e)) => whatever!("Server task failed: {e}"),
        Err(_) => {
            tracing::error!("Server forced to shutdown");
            eprintln!("ERROR: Server forced to shutdown");
        }
    }

    tracing::info!("Server exiting");
    println!("INFO: Server exiting");
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let admins = AdminCredentials::load(&cli.credentials)
        .whatever_context("Can't load admin credentials")?;

    logging::init((!cli.no_log).then_some(cli.log_file.as_path()));
    tracing::info!(
        htpasswd = %cli.htpasswd.display(),
        admins = admins.len(),
        version = env!("CARGO_PKG_VERSION"),
        "starting htadmin server"
    );

    let state = AppState::new(HtpasswdFile::new(&cli.htpasswd), admins);
    let runtime = tokio::runtime::Runtime::new().whatever_context("Can't start tokio runtime")?;
    runtime.block_on(serve(cli.listen, state))
}

#[snafu::report]
fn main() -> Result<()> {
    run()
}
