//! Configuration management commands

use super::{ConfigAction, ConfigArgs};
use crate::config::Config;
use anyhow::Result;

pub async fn execute(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = Config::load().await?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            Config::init_default().await?;
            println!("Configuration initialized");
        }
        ConfigAction::Set { key, value } => {
            Config::set(&key, &value).await?;
            println!("Set {} = {}", key, value);
        }
    }
    Ok(())
}
