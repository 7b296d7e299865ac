use anyhow::Result;
use callbridge::app::{self, AppStateBuilder};
use callbridge::config::{Cli, Config};
use callbridge::version;
use clap::Parser;
use std::fs::File;
use tokio::select;
use tracing::{info, level_filters::LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = cli
        .conf
        .map(|conf| Config::load(&conf).expect("Failed to load config"))
        .unwrap_or_else(|| {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        });

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }

    if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file).expect("Failed to create log file");
        let (non_blocking, _guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
    } else {
        log_fmt.try_init().ok();
    }

    let state = AppStateBuilder::new().config(config).build()?;

    info!("{}", version::get_version_info());
    info!("Starting callbridge on {}", state.config.http_addr);

    // The server stays on its own task so webhooks keep flowing while
    // shutdown waits out in-progress calls.
    let mut server = tokio::spawn(app::run(state.clone()));
    select! {
        result = &mut server => {
            if let Ok(Err(e)) = result {
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C, shutting down");
            app::wait_for_live_calls(&state).await;
        }
    }
    state.token.cancel();
    Ok(())
}
