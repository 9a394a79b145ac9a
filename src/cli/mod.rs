mod config_cmd;
mod watch;

use anyhow::{Context, Result};
use console::style;

use towerwatch::core::config::SyncConfig;
use towerwatch::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Stream")
        .command("watch", "Connect and follow live events until Ctrl+C")
        .print();

    GuideSection::new("Setup")
        .command("config", "Print the effective configuration")
        .command("help", "Show this guide")
        .print();

    GuideSection::new("Flags")
        .command("--api-url <url>", "Backend base URL (http/https)")
        .command("--ws-url <url>", "Explicit ws/wss endpoint base")
        .command("--config <file>", "TOML file layered under env and flags")
        .command("--topic <name>", "Extra topic to subscribe (repeatable)")
        .command("--verbose, -v", "Show debug logs on stderr")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("towerwatch").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StreamArgs {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub config_path: Option<String>,
    pub topics: Vec<String>,
    pub verbose: bool,
}

pub(crate) fn parse_stream_flags(args: &[String], start: usize) -> StreamArgs {
    let mut parsed = StreamArgs::default();
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--api-url" => {
                if let Some(v) = value {
                    parsed.api_url = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--ws-url" => {
                if let Some(v) = value {
                    parsed.ws_url = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if let Some(v) = value {
                    parsed.config_path = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--topic" | "-t" => {
                if let Some(v) = value {
                    parsed.topics.push(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    parsed
}

/// Defaults, then the TOML file, then `TOWERWATCH_*`, then flags.
pub(crate) async fn resolve_config(args: &StreamArgs) -> Result<SyncConfig> {
    let mut config = match &args.config_path {
        Some(path) => SyncConfig::load(path).await?,
        None => SyncConfig::default(),
    };
    config
        .apply_process_env()
        .context("Invalid TOWERWATCH_* environment")?;
    apply_flags(&mut config, args);
    config.validate()?;
    Ok(config)
}

pub(crate) fn apply_flags(config: &mut SyncConfig, args: &StreamArgs) {
    if let Some(url) = &args.api_url {
        config.api_url = url.clone();
    }
    if let Some(url) = &args.ws_url {
        config.ws_url = Some(url.clone());
    }
    for topic in &args.topics {
        if !config.topics.contains(topic) {
            config.topics.push(topic.clone());
        }
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "watch" => watch::run_watch(parse_stream_flags(&args, 2)).await,
        "config" => config_cmd::show_config(parse_stream_flags(&args, 2)).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StreamArgs, apply_flags, parse_stream_flags};
    use towerwatch::core::config::SyncConfig;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn parse_stream_flags_reads_urls_and_repeated_topics() {
        let args = argv(&[
            "towerwatch",
            "watch",
            "--api-url",
            "https://ops.example.com",
            "--topic",
            "tool_invocations",
            "-t",
            "execution_logs",
            "-v",
        ]);
        let parsed = parse_stream_flags(&args, 2);
        assert_eq!(parsed.api_url.as_deref(), Some("https://ops.example.com"));
        assert_eq!(parsed.topics, vec!["tool_invocations", "execution_logs"]);
        assert!(parsed.verbose);
        assert_eq!(parsed.ws_url, None);
    }

    #[test]
    fn dangling_flag_is_ignored() {
        let args = argv(&["towerwatch", "config", "--config"]);
        assert_eq!(parse_stream_flags(&args, 2), StreamArgs::default());
    }

    #[test]
    fn flags_override_and_extend_config() {
        let mut config = SyncConfig::default();
        let args = StreamArgs {
            ws_url: Some("wss://stream.example.com".into()),
            topics: vec!["approvals".into(), "execution_logs".into()],
            ..StreamArgs::default()
        };
        apply_flags(&mut config, &args);
        assert_eq!(config.ws_url.as_deref(), Some("wss://stream.example.com"));
        assert_eq!(config.topics.len(), 5);
        assert_eq!(config.topics.last().map(String::as_str), Some("execution_logs"));
    }
}
