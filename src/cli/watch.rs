use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::{StreamArgs, resolve_config};
use towerwatch::core::connection::ConnectionStatus;
use towerwatch::core::connection::transport::WsConnector;
use towerwatch::core::session::ConsoleSession;
use towerwatch::core::terminal::{self, print_status, print_warn};
use towerwatch::logging::{LogTap, init_logging};

const RECENT_WARNINGS: usize = 5;

pub async fn run_watch(args: StreamArgs) -> Result<()> {
    // Without --verbose, logs only feed the warning digest.
    let tap = LogTap::new(256, !args.verbose);
    let mut log_rx = tap.subscribe();
    init_logging(tap, args.verbose);

    let config = resolve_config(&args).await?;
    terminal::print_banner();

    let session = ConsoleSession::init(&config, Arc::new(WsConnector))?;
    let connection = session.connection();
    print_status("Client", connection.client_id());
    print_status("Endpoint", connection.endpoint());
    print_status("Topics", &connection.subscriptions().join(", "));
    println!();

    let _echo = connection.on_message(|event| {
        if let Some(line) = terminal::event_line(event) {
            println!("  {}", line);
        }
    });

    let mut status = connection.watch_status();
    terminal::print_connection(&status.borrow_and_update());
    let mut warnings: VecDeque<String> = VecDeque::with_capacity(RECENT_WARNINGS);
    let mut tap_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                terminal::print_connection(&snapshot);
                if snapshot.status == ConnectionStatus::Error {
                    print_warn("Reconnect budget exhausted. Press Ctrl+C to exit.");
                }
            }
            line = log_rx.recv(), if tap_open => match line {
                Ok(line) => {
                    if line.contains("WARN") || line.contains("ERROR") {
                        if warnings.len() == RECENT_WARNINGS {
                            warnings.pop_front();
                        }
                        warnings.push_back(line);
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => tap_open = false,
            }
        }
    }

    session.read(terminal::print_summary);
    if !warnings.is_empty() {
        println!();
        for line in &warnings {
            print_warn(line);
        }
    }
    session.teardown().await;
    Ok(())
}
