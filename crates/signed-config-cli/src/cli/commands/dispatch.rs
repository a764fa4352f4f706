use super::super::args::*;
use crate::exit_codes::EXIT_SUCCESS;

use signed_config::RemoteConfig;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    if let Command::Version = cli.cmd {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(EXIT_SUCCESS);
    }

    let mut settings = cli.global.settings();
    if let Command::Poll(args) = &cli.cmd {
        settings = super::poll::apply_args(settings, args);
    }
    let remote = RemoteConfig::open(settings).await?;

    match cli.cmd {
        Command::Get(args) => Ok(super::get::cmd_get(&remote, &args)),
        Command::Dump(args) => super::get::cmd_dump(&remote, &args),
        Command::Fetch(args) => super::fetch::run(&remote, &args).await,
        Command::Poll(args) => super::poll::run(&remote, &args).await,
        Command::Version => Ok(EXIT_SUCCESS),
    }
}
