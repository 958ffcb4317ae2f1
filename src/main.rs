//! mysocks CLI entry point
//!
//! Runs a local SOCKS5 listener that tunnels CONNECT traffic through an
//! AEAD-encrypted Shadowsocks-style connection to a remote server.

use clap::Parser;
use mysocks::crypto::CipherSpec;
use mysocks::relay::{self, RelayConfig};
use mysocks::VERSION;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mysocks")]
#[command(version = VERSION)]
#[command(about = "SOCKS5-to-Shadowsocks AEAD tunneling client")]
struct Args {
    /// host:port of the remote Shadowsocks server
    #[arg(long = "server-url")]
    server_url: String,

    /// Shared password
    #[arg(long = "password")]
    password: String,

    /// Local TCP port to bind
    #[arg(long = "port", default_value_t = 8888)]
    port: u16,

    /// AEAD cipher: aes-128-gcm, aes-192-gcm, or aes-256-gcm
    #[arg(long = "cipher", default_value = "aes-128-gcm")]
    cipher: String,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("mysocks-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let _log_guard = init_logging();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Normalize clap's usage-error exit code (2) to 1, matching the
            // other fatal startup conditions (unsupported cipher, bind
            // failure) so callers only ever see 0 or 1.
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    info!("mysocks v{VERSION}");

    let cipher = match CipherSpec::new(&args.cipher, &args.password) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("unsupported cipher {:?}: {e}", args.cipher);
            std::process::exit(1);
        }
    };

    let config = RelayConfig {
        listen_port: args.port,
        server_addr: args.server_url,
        cipher,
    };

    if let Err(e) = relay::run(config).await {
        error!("relay error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize tracing. Silent unless `DEBUG` is set, matching the
/// reference implementation's opt-in file logger; when enabled, writes
/// append-mode to `mysocks.log` in the working directory and returns a
/// guard that must stay alive for the process lifetime.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let debug_enabled = std::env::var("DEBUG").map(|v| !v.is_empty()).unwrap_or(false);
    if !debug_enabled {
        return None;
    }

    let appender = tracing_appender::rolling::never(".", "mysocks.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mysocks=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
        .init();

    Some(guard)
}
