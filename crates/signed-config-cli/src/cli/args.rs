use clap::{Args, Parser, Subcommand, ValueEnum};
use signed_config::Settings;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "signed-config",
    version,
    about = "Fetch, verify and inspect signed remote configuration"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print one value of the active config
    Get(GetArgs),
    /// Print the whole active config
    Dump(DumpArgs),
    /// Fetch, verify and apply the current config once
    Fetch(FetchArgs),
    /// Poll the config service until interrupted
    Poll(PollArgs),
    Version,
}

/// Connection and storage options, read from `SIGNED_CONFIG_*` when not given.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config service base URL
    #[arg(long, global = true, env = "SIGNED_CONFIG_URL")]
    pub url: Option<String>,

    /// Application identifier
    #[arg(long, global = true, env = "SIGNED_CONFIG_APP_ID")]
    pub app_id: Option<String>,

    /// Subscription key
    #[arg(
        long,
        global = true,
        env = "SIGNED_CONFIG_SUBSCRIPTION_KEY",
        hide_env_values = true
    )]
    pub subscription_key: Option<String>,

    /// Cache directory
    #[arg(long, global = true, env = "SIGNED_CONFIG_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Key store directory
    #[arg(long, global = true, env = "SIGNED_CONFIG_KEY_DIR")]
    pub key_dir: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = "SIGNED_CONFIG_TIMEOUT")]
    pub timeout: Option<u64>,
}

impl GlobalArgs {
    /// Environment settings with command line overrides applied.
    pub fn settings(&self) -> Settings {
        let mut settings =
            Settings::from_env().with_app_info("signed-config-cli", env!("CARGO_PKG_VERSION"));
        if let Some(url) = &self.url {
            settings = settings.with_url(url.clone());
        }
        if let Some(app_id) = &self.app_id {
            settings = settings.with_app_id(app_id.clone());
        }
        if let Some(key) = &self.subscription_key {
            settings = settings.with_subscription_key(key.clone());
        }
        if let Some(dir) = &self.cache_dir {
            settings = settings.with_cache_dir(dir.clone());
        }
        if let Some(dir) = &self.key_dir {
            settings = settings.with_key_dir(dir.clone());
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        settings
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    String,
    Bool,
    Number,
}

#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    /// Config key
    pub key: String,

    /// Value printed when the key is absent or not of the requested kind
    #[arg(long)]
    pub fallback: Option<String>,

    /// Interpret the value as this kind
    #[arg(long = "as", value_enum, default_value_t = ValueKind::String)]
    pub kind: ValueKind,
}

#[derive(Args, Debug, Clone)]
pub struct DumpArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PollArgs {
    /// Poll interval in seconds, at least 60
    #[arg(long, env = "SIGNED_CONFIG_POLL_INTERVAL")]
    pub interval: Option<u64>,

    /// Activate new configs as soon as they verify (SIGNED_CONFIG_APPLY_IMMEDIATELY)
    #[arg(long)]
    pub apply_immediately: bool,

    /// Duration to run (e.g. "10m"). If omitted, runs until Ctrl-C.
    #[arg(long)]
    pub duration: Option<humantime::Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn get_parses_kind_and_fallback() {
        let cli = Cli::try_parse_from([
            "signed-config",
            "get",
            "timeout_ms",
            "--as",
            "number",
            "--fallback",
            "500",
        ])
        .expect("parse should succeed");

        match cli.cmd {
            Command::Get(args) => {
                assert_eq!(args.key, "timeout_ms");
                assert_eq!(args.kind, ValueKind::Number);
                assert_eq!(args.fallback.as_deref(), Some("500"));
            }
            _ => panic!("expected Command::Get"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "signed-config",
            "dump",
            "--url",
            "https://config.example.com",
            "--app-id",
            "app-1",
            "--cache-dir",
            "/tmp/cache",
        ])
        .expect("parse should succeed");

        let settings = cli.global.settings();
        assert_eq!(settings.url.as_deref(), Some("https://config.example.com"));
        assert_eq!(settings.app_id.as_deref(), Some("app-1"));
        assert_eq!(settings.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(settings.app_name.as_deref(), Some("signed-config-cli"));
    }

    #[test]
    #[serial]
    fn global_options_read_environment() {
        std::env::set_var("SIGNED_CONFIG_APP_ID", "env-app");
        std::env::set_var("SIGNED_CONFIG_TIMEOUT", "7");

        let from_env = Cli::try_parse_from(["signed-config", "dump"]);
        let overridden = Cli::try_parse_from(["signed-config", "dump", "--app-id", "flag-app"]);
        let invalid = {
            std::env::set_var("SIGNED_CONFIG_TIMEOUT", "soon");
            Cli::try_parse_from(["signed-config", "dump"])
        };

        std::env::remove_var("SIGNED_CONFIG_APP_ID");
        std::env::remove_var("SIGNED_CONFIG_TIMEOUT");

        let global = from_env.expect("parse should succeed").global;
        assert_eq!(global.app_id.as_deref(), Some("env-app"));
        assert_eq!(global.timeout, Some(7));
        assert_eq!(global.settings().timeout_secs, 7);

        let global = overridden.expect("parse should succeed").global;
        assert_eq!(global.app_id.as_deref(), Some("flag-app"));
        assert!(invalid.is_err());
    }

    #[test]
    fn poll_parses_duration() {
        let cli = Cli::try_parse_from([
            "signed-config",
            "poll",
            "--interval",
            "120",
            "--apply-immediately",
            "--duration",
            "90s",
        ])
        .expect("parse should succeed");

        match cli.cmd {
            Command::Poll(args) => {
                assert_eq!(args.interval, Some(120));
                assert!(args.apply_immediately);
                assert_eq!(args.duration.map(Duration::from), Some(Duration::from_secs(90)));
            }
            _ => panic!("expected Command::Poll"),
        }
    }
}
