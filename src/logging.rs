use std::io::Write;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Tees formatted log lines into a broadcast channel (the `watch` log tap)
/// and, unless suppressed, to stderr.
#[derive(Clone)]
pub struct LogTap {
    sender: broadcast::Sender<String>,
    suppress_console: bool,
}

impl LogTap {
    pub fn new(capacity: usize, suppress_console: bool) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            suppress_console,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl<'a> MakeWriter<'a> for LogTap {
    type Writer = LogTapWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogTapWriter {
            sender: self.sender.clone(),
            suppress_console: self.suppress_console,
        }
    }
}

pub struct LogTapWriter {
    sender: broadcast::Sender<String>,
    suppress_console: bool,
}

impl Write for LogTapWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).trim_end().to_string();
        let _ = self.sender.send(line); // no receivers is fine
        if !self.suppress_console {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_console {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

/// `TOWERWATCH_LOG` takes a filter directive; otherwise `verbose` picks
/// between debug and info for this crate.
pub fn filter(verbose: bool, directive: Option<&str>) -> EnvFilter {
    if let Some(directive) = directive
        && let Ok(filter) = EnvFilter::try_new(directive)
    {
        return filter;
    }
    EnvFilter::new(if verbose {
        "towerwatch=debug"
    } else {
        "towerwatch=info"
    })
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(tap: LogTap, verbose: bool) {
    let directive = std::env::var("TOWERWATCH_LOG").ok();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, directive.as_deref()))
        .with_target(false)
        .with_writer(tap)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_forwards_lines_to_subscribers() {
        let tap = LogTap::new(8, true);
        let mut rx = tap.subscribe();
        let mut writer = tap.make_writer();
        writer.write_all(b"INFO connected\n").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "INFO connected");
    }

    #[test]
    fn explicit_directive_wins_over_verbosity() {
        assert_eq!(
            filter(false, Some("towerwatch=trace")).to_string(),
            "towerwatch=trace"
        );
        assert_eq!(filter(true, None).to_string(), "towerwatch=debug");
    }
}
