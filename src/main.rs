use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use remote_workspace::util::init_logging;
use remote_workspace::workspace::{LogFormat, ServerConfig};

/// Remote workspace server: file store, repository sync and command runner
#[derive(Parser, Debug)]
#[command(name = "remote-workspace", version, about)]
struct Cli {
    /// Config file (TOML). Defaults to the platform config dir.
    #[arg(long, env = "REMOTE_WORKSPACE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Workspace root directory
    #[arg(long, env = "WORKSPACE_DIR")]
    workspace: Option<PathBuf>,

    /// Serve static frontend assets from this directory
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Repository re-cloned on the refresh schedule
    #[arg(long, env = "DEFAULT_REPO_URL")]
    repo_url: Option<String>,

    /// Cron expression for the scheduled refresh
    #[arg(long, env = "REFRESH_SCHEDULE")]
    schedule: Option<String>,

    /// Command executed by `POST /run`
    #[arg(long, env = "RUN_COMMAND")]
    run_command: Option<String>,

    /// pretty | json
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match self.config.clone().or_else(ServerConfig::default_path) {
            Some(path) => ServerConfig::load(&path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.workspace {
            config.workspace_dir = dir.clone();
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir = Some(dir.clone());
        }
        if let Some(url) = &self.repo_url {
            config.default_repo_url = Some(url.clone());
        }
        if let Some(expr) = &self.schedule {
            config.refresh_schedule = expr.clone();
        }
        if let Some(command) = &self.run_command {
            config.run_command = command.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_logging(config.log_format);

    info!(
        "Starting remote workspace server on {} (workspace: {})",
        config.bind_addr(),
        config.workspace_dir.display()
    );

    remote_workspace::server::run_server(config).await
}
