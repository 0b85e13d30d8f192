//! Viaduct Proxy -- cross-revision packet translation.
//!
//! Usage:
//!   viaduct-proxy pipe                         # client -> server, framed stdin -> stdout
//!   viaduct-proxy pipe --reverse               # server -> client
//!   viaduct-proxy pipe --from 4.2 --to 3.2     # explicit revisions
//!   viaduct-proxy translate --name X --body F  # translate one body
//!   viaduct-proxy versions                     # show known revisions

use std::io::{Read, Write};

use clap::{Parser, Subcommand};
use viaduct_mapping::CommandMapping;
use viaduct_protocol::{ProtocolVersion, SUPPORTED_VERSIONS};
use viaduct_proxy::config::ProxyConfig;
use viaduct_proxy::session::{self, Leg};
use viaduct_proxy::{build_translator, expand_tilde};

#[derive(Parser)]
#[command(name = "viaduct-proxy", about = "Cross-revision packet translation proxy")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "~/.viaduct/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate length-prefixed packet frames from stdin to stdout
    Pipe {
        /// Source revision (defaults to the configured client revision)
        #[arg(long)]
        from: Option<ProtocolVersion>,
        /// Destination revision (defaults to the configured server revision)
        #[arg(long)]
        to: Option<ProtocolVersion>,
        /// Swap source and destination after defaults are applied
        #[arg(long)]
        reverse: bool,
    },
    /// Translate a single packet body
    Translate {
        /// Source revision (defaults to the configured client revision)
        #[arg(long)]
        from: Option<ProtocolVersion>,
        /// Destination revision (defaults to the configured server revision)
        #[arg(long)]
        to: Option<ProtocolVersion>,
        /// Packet name
        #[arg(long)]
        name: String,
        /// Body file, or "-" for stdin
        #[arg(long, default_value = "-")]
        body: String,
        /// Print recorded issues as JSON lines on stderr
        #[arg(long)]
        issues: bool,
    },
    /// List known revisions and command table coverage
    Versions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries packet data; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viaduct_proxy=info,viaduct_engine=info,viaduct_mapping=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let cfg = ProxyConfig::load_or_default(&config_path)?;
    let translator = build_translator(&cfg)?;

    match cli.command {
        Commands::Pipe { from, to, reverse } => {
            let mut leg = Leg::new(
                from.unwrap_or(cfg.proxy.client_version),
                to.unwrap_or(cfg.proxy.server_version),
            );
            if reverse {
                leg = leg.reversed();
            }
            tracing::info!(from = %leg.from, to = %leg.to, "pipe: starting");
            let stats =
                session::run_pipe(translator, leg, tokio::io::stdin(), tokio::io::stdout()).await?;
            if stats.fallbacks > 0 || stats.skipped > 0 {
                tracing::warn!(
                    packets = stats.packets,
                    fallbacks = stats.fallbacks,
                    skipped = stats.skipped,
                    "pipe: some packets were forwarded untranslated"
                );
            }
        }
        Commands::Translate {
            from,
            to,
            name,
            body,
            issues,
        } => {
            let from = from.unwrap_or(cfg.proxy.client_version);
            let to = to.unwrap_or(cfg.proxy.server_version);
            let input = read_body(&body)?;

            let (result, log) = translator.translate_traced(from, to, &name, &[], input.into());
            if issues {
                let mut stderr = std::io::stderr().lock();
                for issue in log.all() {
                    writeln!(stderr, "{}", serde_json::to_string(issue)?)?;
                }
            }

            let mut stdout = std::io::stdout().lock();
            match result {
                Ok(out) => stdout.write_all(&out)?,
                Err(failure) => {
                    stdout.write_all(&failure.original)?;
                    stdout.flush()?;
                    return Err(failure.into());
                }
            }
            stdout.flush()?;
        }
        Commands::Versions => {
            let table = translator.mapping().snapshot();
            println!("Built-in rules target:");
            for v in SUPPORTED_VERSIONS {
                println!("  {v}");
            }
            println!("Command table ({}):", table.fingerprint());
            for v in table.versions() {
                println!("  {v}: {} commands", table.command_count(v));
            }
            println!(
                "Configured: client {} -> server {}",
                cfg.proxy.client_version, cfg.proxy.server_version
            );
        }
    }

    Ok(())
}

fn read_body(source: &str) -> anyhow::Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read(expand_tilde(source))?)
    }
}
