// src/lock.rs
// Named asynchronous critical sections, one queue per key.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes async sections by name. All callers acquiring the same key
/// queue behind one mutex; distinct keys proceed independently.
#[derive(Default)]
pub struct KeyedLock {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the named section; held until the returned guard drops.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_sections_do_not_interleave() {
        let lock = Arc::new(KeyedLock::new());
        let journal = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let lock = lock.clone();
            let journal = journal.clone();
            handles.push(tokio::spawn(async move {
                let _guard = lock.acquire("shared").await;
                journal.lock().await.push((i, "enter"));
                tokio::task::yield_now().await;
                journal.lock().await.push((i, "exit"));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let journal = journal.lock().await;
        for pair in journal.chunks(2) {
            assert_eq!(pair[0].0, pair[1].0);
            assert_eq!(pair[0].1, "enter");
            assert_eq!(pair[1].1, "exit");
        }
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let lock = KeyedLock::new();
        let _a = lock.acquire("a").await;
        // would deadlock if "b" queued behind "a"
        let _b = lock.acquire("b").await;
    }
}
