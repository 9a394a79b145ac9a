use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::error;

use crate::core::router::events::InboundEvent;

pub type Listener = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

#[derive(Default)]
struct Table {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// External observers of decoded events.
#[derive(Clone, Default)]
pub struct ListenerSet {
    table: Arc<Mutex<Table>>,
}

fn lock(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|p| p.into_inner())
}

impl ListenerSet {
    pub fn add<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let mut table = lock(&self.table);
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `event`. A panicking listener is logged and
    /// skipped; the rest still run.
    pub fn notify(&self, event: &InboundEvent) {
        // Snapshot so listeners may add or remove listeners while running.
        let entries: Vec<(u64, Listener)> = lock(&self.table).entries.clone();
        for (id, listener) in entries {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(
                    "Listener {} panicked while handling {}",
                    id,
                    event.body.kind()
                );
            }
        }
    }
}

/// Registration token returned by `on_message`.
pub struct ListenerHandle {
    id: u64,
    table: Weak<Mutex<Table>>,
}

impl ListenerHandle {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        let mut table = lock(&table);
        let before = table.entries.len();
        table.entries.retain(|(id, _)| *id != self.id);
        table.entries.len() != before
    }
}
