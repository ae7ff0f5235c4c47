use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use settings::{
    Cluster,
    SettingsStore,
};
use std::path::PathBuf;

mod client;
mod ui;
mod wallets;

#[derive(Debug, Parser)]
#[command(name = "memecrate", about = "Terminal client for the memecrate crate game")]
#[command(group(ArgGroup::new("cluster").args(["devnet", "mainnet", "local"])))]
struct Cli {
    /// Play on Solana devnet (default)
    #[arg(long)]
    devnet: bool,
    /// Play on Solana mainnet-beta
    #[arg(long)]
    mainnet: bool,
    /// Play against a local validator
    #[arg(long)]
    local: bool,
    /// Override the RPC URL for the selected cluster
    #[arg(long)]
    rpc_url: Option<String>,
    /// Game backend HTTP endpoint
    #[arg(long)]
    backend_url: Option<String>,
    /// Keypair file name (without .json) to connect on startup
    #[arg(long)]
    wallet: Option<String>,
    /// Directory holding keypair files (defaults to ~/.config/solana)
    #[arg(long)]
    wallet_dir: Option<String>,
    /// Where the daily log file is written
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Remember the resolved connection settings for this cluster
    #[arg(long)]
    save: bool,
}

impl Cli {
    fn cluster(&self) -> Cluster {
        if self.mainnet {
            Cluster::Mainnet
        } else if self.local {
            Cluster::Local
        } else {
            Cluster::Devnet
        }
    }
}

fn build_config(cli: Cli) -> Result<client::AppConfig> {
    let cluster = cli.cluster();
    let store = SettingsStore::new(cluster).map_err(|e| eyre!(e))?;
    let mut resolved = store.resolve(cluster).map_err(|e| eyre!(e))?;
    if let Some(url) = cli.rpc_url {
        resolved.rpc_url = url;
    }
    if let Some(url) = cli.backend_url {
        resolved.backend_url = url;
    }
    if cli.wallet.is_some() {
        resolved.wallet = cli.wallet;
    }
    if cli.wallet_dir.is_some() {
        resolved.wallet_dir = cli.wallet_dir;
    }
    if cli.save {
        store.save(&resolved.to_record()).map_err(|e| eyre!(e))?;
        tracing::info!(path = %store.path().display(), "saved settings");
    }

    let wallet_dir = wallets::resolve_wallet_dir(resolved.wallet_dir.as_deref())?;
    Ok(client::AppConfig {
        cluster,
        backend_url: resolved.backend_url,
        rpc_url: resolved.rpc_url,
        wallet_dir,
        wallet: resolved.wallet,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(settings::SETTINGS_ROOT).join("logs"));
    // stdout belongs to the terminal UI, so logs go to a file
    let _log_guard = client::init_tracing(&log_dir)?;
    tracing::info!("starting memecrate client");
    let app_config = build_config(cli)?;
    tracing::info!(
        cluster = %app_config.cluster,
        backend = %app_config.backend_url,
        rpc = %app_config.rpc_url,
        "resolved configuration"
    );
    client::run_app(app_config).await
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli__defaults_to_devnet() {
        let cli = Cli::parse_from(["memecrate"]);
        assert_eq!(cli.cluster(), Cluster::Devnet);
    }

    #[test]
    fn cli__rejects_two_clusters() {
        let result = Cli::try_parse_from(["memecrate", "--devnet", "--mainnet"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli__reads_overrides() {
        // when
        let cli = Cli::parse_from([
            "memecrate",
            "--local",
            "--rpc-url",
            "http://127.0.0.1:9000",
            "--wallet",
            "player",
        ]);

        // then
        assert_eq!(cli.cluster(), Cluster::Local);
        assert_eq!(cli.rpc_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(cli.wallet.as_deref(), Some("player"));
    }
}
