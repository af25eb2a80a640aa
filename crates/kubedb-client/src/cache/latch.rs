use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use event_listener::Event;
use tracing::trace;

/// Gate that opens once and stays open. Used for the first-sync and shutdown
/// signals of a cache; waiting on an open latch returns immediately.
#[derive(Debug, Default)]
pub struct Latch {
    open: AtomicBool,
    opened: Event,
}

impl Latch {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        while !self.is_open() {
            let listener = self.opened.listen();
            // opened between the check and registering the listener
            if self.is_open() {
                break;
            }
            listener.await;
        }
        trace!("latch open");
    }

    /// open the latch and wake every waiter; later calls do nothing
    pub fn open(&self) {
        if !self.open.swap(true, Ordering::AcqRel) {
            self.opened.notify(usize::MAX);
        }
    }
}
