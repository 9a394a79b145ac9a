use anyhow::Result;

use super::{StreamArgs, resolve_config};
use towerwatch::core::terminal::{print_status, print_success};

pub async fn show_config(args: StreamArgs) -> Result<()> {
    let config = resolve_config(&args).await?;
    let rendered = toml::to_string_pretty(&config)?;
    print_success("Configuration is valid");
    print_status("Socket base", config.websocket_base()?.as_str());
    println!("\n{}", rendered);
    Ok(())
}
