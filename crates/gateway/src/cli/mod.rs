pub mod config;

use clap::{Parser, Subcommand};

use hl_domain::config::Config;

/// Hookline, a multi-tenant messaging gateway with webhook fan-out.
#[derive(Debug, Parser)]
#[command(name = "hookline", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `HL_CONFIG` (or
/// `config.toml` by default), then apply environment overrides. Returns
/// the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("HL_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    apply_port_override(&mut config, std::env::var("PORT").ok().as_deref())?;
    Ok((config, config_path))
}

/// `PORT` wins over `server.port`, matching common hosting platforms.
pub fn apply_port_override(config: &mut Config, port: Option<&str>) -> anyhow::Result<()> {
    let Some(raw) = port.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    config.server.port = raw
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid PORT value {raw:?}: {e}"))?;
    Ok(())
}
