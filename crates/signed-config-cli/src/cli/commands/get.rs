use super::super::args::{DumpArgs, GetArgs, ValueKind};
use super::print_config;
use crate::exit_codes::{EXIT_KEY_MISSING, EXIT_SUCCESS};

use signed_config::RemoteConfig;

/// Resolve one value the way an embedding application would.
///
/// Returns `None` when the key is absent and no fallback was given.
pub(crate) fn resolve(remote: &RemoteConfig, args: &GetArgs) -> Option<String> {
    let present = remote.active_config().get(&args.key).is_some();
    if !present && args.fallback.is_none() {
        return None;
    }
    let fallback = args.fallback.as_deref().unwrap_or_default();

    let value = match args.kind {
        ValueKind::String => remote.get_string(&args.key, fallback),
        ValueKind::Bool => {
            let fallback = fallback.eq_ignore_ascii_case("true");
            remote.get_bool(&args.key, fallback).to_string()
        }
        ValueKind::Number => {
            let fallback = fallback.trim().parse().unwrap_or(f64::NAN);
            let value: f64 = remote.get_number(&args.key, fallback);
            if value.is_nan() {
                return None;
            }
            value.to_string()
        }
    };
    Some(value)
}

pub fn cmd_get(remote: &RemoteConfig, args: &GetArgs) -> i32 {
    match resolve(remote, args) {
        Some(value) => {
            println!("{}", value);
            EXIT_SUCCESS
        }
        None => {
            eprintln!("key not set: {}", args.key);
            EXIT_KEY_MISSING
        }
    }
}

pub fn cmd_dump(remote: &RemoteConfig, args: &DumpArgs) -> anyhow::Result<i32> {
    let active = remote.active_config();
    if active.is_empty() {
        eprintln!("no verified config is active");
    }
    print_config(active.values(), args.json)?;
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use signed_config::Settings;
    use tempfile::TempDir;

    async fn empty_remote(dir: &TempDir) -> RemoteConfig {
        let settings = Settings::default()
            .with_url("http://127.0.0.1:9")
            .with_app_id("cli-test")
            .with_cache_dir(dir.path().join("cache"))
            .with_key_dir(dir.path().join("keys"));
        RemoteConfig::open(settings).await.unwrap()
    }

    fn get_args(key: &str, fallback: Option<&str>, kind: ValueKind) -> GetArgs {
        GetArgs {
            key: key.to_string(),
            fallback: fallback.map(String::from),
            kind,
        }
    }

    #[tokio::test]
    async fn missing_key_without_fallback_is_reported() {
        let dir = TempDir::new().unwrap();
        let remote = empty_remote(&dir).await;

        let args = get_args("feature", None, ValueKind::String);
        assert_eq!(resolve(&remote, &args), None);
        assert_eq!(cmd_get(&remote, &args), EXIT_KEY_MISSING);
    }

    #[tokio::test]
    async fn missing_key_uses_typed_fallback() {
        let dir = TempDir::new().unwrap();
        let remote = empty_remote(&dir).await;

        let args = get_args("feature", Some("TRUE"), ValueKind::Bool);
        assert_eq!(resolve(&remote, &args).as_deref(), Some("true"));

        let args = get_args("timeout", Some("1.5"), ValueKind::Number);
        assert_eq!(resolve(&remote, &args).as_deref(), Some("1.5"));

        let args = get_args("timeout", Some("soon"), ValueKind::Number);
        assert_eq!(resolve(&remote, &args), None);

        let args = get_args("greeting", Some("hi"), ValueKind::String);
        assert_eq!(cmd_get(&remote, &args), EXIT_SUCCESS);
    }
}
