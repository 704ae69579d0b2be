use anyhow::Result;
use clap::Args;
use colored::*;

use signon_mock_core::BrokerConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Also print where the default configuration file lives
    #[arg(long)]
    show_path: bool,
}

pub fn execute(args: ConfigArgs, config: &BrokerConfig) -> Result<()> {
    if args.show_path {
        match BrokerConfig::default_config_path() {
            Some(path) => println!("{} {}", "# Config file:".dimmed(), path.display()),
            None => println!("{}", "# No config directory on this platform".dimmed()),
        }
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
