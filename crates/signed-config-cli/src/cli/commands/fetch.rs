use super::super::args::FetchArgs;
use super::print_config;
use crate::exit_codes::EXIT_SUCCESS;

use signed_config::{CycleOutcome, RemoteConfig};

pub async fn run(remote: &RemoteConfig, args: &FetchArgs) -> anyhow::Result<i32> {
    match remote.try_fetch_and_apply().await {
        Ok(CycleOutcome::Applied(config)) | Ok(CycleOutcome::Staged(config)) => {
            print_config(&config, args.json)?;
            Ok(EXIT_SUCCESS)
        }
        Ok(CycleOutcome::NotModified) => {
            eprintln!("config not modified");
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("fetch failed: {}", e);
            Ok(e.exit_code())
        }
    }
}
