//! Named coroutine lockers.
//!
//! Critical sections that span await points (WebSocket reconnects, order-map
//! updates, subscription registration) are serialized through a process-wide
//! registry of named async mutexes. A locker is created on first use and
//! lives for the process lifetime.
//!
//! With `wait = false` the caller does not queue behind a held locker: the
//! guarded future is dropped unexecuted and [`run`] returns `None`. This is
//! how overlapping reconnect attempts are collapsed into one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::Mutex as AsyncMutex;

static LOCKERS: OnceLock<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>> = OnceLock::new();

/// Fetch (or create) the locker registered under `name`.
pub fn named(name: &str) -> Arc<AsyncMutex<()>> {
    let registry = LOCKERS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().expect("locker registry poisoned");
    map.entry(name.to_owned())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Run `fut` while holding the locker registered under `name`.
///
/// When `wait` is `true` the caller queues until the locker is free. When
/// `wait` is `false` and the locker is already held, `fut` is not executed
/// and `None` is returned.
pub async fn run<F>(name: &str, wait: bool, fut: F) -> Option<F::Output>
where
    F: Future,
{
    let locker = named(name);
    let _guard = if wait {
        locker.lock().await
    } else {
        match locker.try_lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        }
    };
    Some(fut.await)
}
