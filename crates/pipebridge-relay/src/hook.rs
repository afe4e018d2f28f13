//! Process-wide teardown registration.
//!
//! Every started relay registers here so that a termination signal cannot
//! leak a bound listener or an open channel past the process lifetime. The
//! first registration installs the single signal handler; entries are weak,
//! so a stopped or dropped relay's entry is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError, Weak};

use tracing::{debug, warn};

use crate::proxy::ProxyShared;

/// Conventional exit status after a termination signal: 128 + SIGINT.
const INTERRUPT_EXIT: i32 = 130;

static REGISTRY: OnceLock<Mutex<Vec<(u64, Weak<ProxyShared>)>>> = OnceLock::new();
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Register a relay for best-effort teardown on process termination.
pub(crate) fn register(proxy: &std::sync::Arc<ProxyShared>) -> u64 {
    let registry = REGISTRY.get_or_init(|| {
        install_handler();
        Mutex::new(Vec::new())
    });
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((id, std::sync::Arc::downgrade(proxy)));
    debug!(hook = id, "registered teardown hook");
    id
}

/// Remove a relay's entry; safe to call for an id that is already gone.
pub(crate) fn deregister(id: u64) {
    if let Some(registry) = REGISTRY.get() {
        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(entry_id, _)| *entry_id != id);
    }
}

fn install_handler() {
    let result = ctrlc::set_handler(|| {
        stop_all();
        std::process::exit(INTERRUPT_EXIT);
    });
    if let Err(err) = result {
        // The relay still works without the hook; teardown then relies on
        // explicit stop() or Drop.
        warn!(error = %err, "termination hook installation failed");
    }
}

fn stop_all() {
    let Some(registry) = REGISTRY.get() else {
        return;
    };
    let entries: Vec<Weak<ProxyShared>> = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(_, weak)| weak.clone())
        .collect();
    for weak in entries {
        if let Some(shared) = weak.upgrade() {
            shared.stop();
        }
    }
}
