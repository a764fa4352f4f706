use std::time::Duration;

use super::super::args::PollArgs;
use crate::exit_codes::EXIT_SUCCESS;

use signed_config::{RemoteConfig, Settings};
use tracing::info;

/// Apply poll-only flags on top of the global settings.
pub fn apply_args(mut settings: Settings, args: &PollArgs) -> Settings {
    if let Some(interval) = args.interval {
        settings = settings.with_poll_interval(interval);
    }
    if args.apply_immediately {
        settings = settings.with_apply_immediately(true);
    }
    settings
}

pub async fn run(remote: &RemoteConfig, args: &PollArgs) -> anyhow::Result<i32> {
    remote.fetch_and_poll();

    match args.duration {
        Some(duration) => {
            let duration: Duration = duration.into();
            tokio::time::sleep(duration).await;
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    remote.stop_polling();
    let active = remote.active_config();
    info!(
        values = active.values().len(),
        key_id = active.key_id().unwrap_or("none"),
        "polling stopped"
    );
    Ok(EXIT_SUCCESS)
}
