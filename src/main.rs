//! lazyjack - provision per-host pieces of an IPv6-first Kubernetes lab
//!
//! Run the same binary with the same config on every host in the
//! topology; the verb plus the host's roles decide what actually happens.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

use lazyjack::Verb;

#[derive(Parser)]
#[command(name = "lazyjack")]
#[command(author, version, about = "IPv6/dual-stack Kubernetes lab provisioner", long_about = None)]
struct Cli {
    /// Cluster topology/config file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Name of this host in the topology (default: OS hostname)
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Lifecycle verb: init, prepare, up, down, clean, or version
    verb: String,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn os_hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.verb.eq_ignore_ascii_case("version") {
        println!("lazyjack {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let verb = match Verb::parse(&cli.verb) {
        Ok(v) => v,
        Err(e) => {
            error!("{e}; expected one of init, prepare, up, down, clean, version");
            return ExitCode::FAILURE;
        }
    };

    let host = match cli.host.or_else(os_hostname) {
        Some(h) => h,
        None => {
            error!("unable to determine hostname; pass --host");
            return ExitCode::FAILURE;
        }
    };

    match lazyjack::run(verb, &cli.config, &host).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{verb} failed: {e}");
            ExitCode::FAILURE
        }
    }
}
