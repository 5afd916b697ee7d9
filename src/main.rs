use anyhow::Context;
use ctrl_agent::config::Config;
use ctrl_agent::server;
use ctrl_agent::util::PidFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(cfg.log_level()?)
        .init();

    let pid_file = cfg.pid_file.as_ref().map(PidFile::new);
    if let Some(pid_file) = &pid_file {
        if let Some(pid) = pid_file.check()? {
            anyhow::bail!(
                "another instance is already running (pid {}, {})",
                pid,
                pid_file.path().display()
            );
        }
        pid_file.write()?;
    }

    let result = server::listener::run(&cfg).await;

    if let Some(pid_file) = &pid_file {
        if let Err(e) = pid_file.delete() {
            tracing::warn!(error = %e, "Unable to remove PID file");
        }
    }

    result
}
