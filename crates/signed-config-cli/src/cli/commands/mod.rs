pub mod fetch;
pub mod get;
pub mod poll;

mod dispatch;

pub use dispatch::dispatch;

use signed_config::ConfigMap;

/// Print a config as sorted `key=value` lines or as JSON.
pub(crate) fn print_config(config: &ConfigMap, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        for (key, value) in config {
            println!("{}={}", key, value);
        }
    }
    Ok(())
}
