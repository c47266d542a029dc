use std::sync::{Condvar, Mutex};

/// Advisory lock serializing access to the shared repository/proxy
/// model between the load/save worker and UI-thread reads during an
/// in-progress parse. `lock` blocks until free; `lock_if_free` is the
/// non-blocking probe for callers that must not stall the interactive
/// thread.
#[derive(Debug, Default)]
pub struct AdvisoryLock {
    locked: Mutex<bool>,
    freed: Condvar,
}

impl AdvisoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) {
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            locked = self.freed.wait(locked).unwrap();
        }
        *locked = true;
    }

    pub fn lock_if_free(&self) -> bool {
        let mut locked = self.locked.lock().unwrap();
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    pub fn unlock(&self) {
        let mut locked = self.locked.lock().unwrap();
        *locked = false;
        self.freed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lock_if_free_never_blocks() {
        let lock = AdvisoryLock::new();
        assert!(lock.lock_if_free());
        assert!(!lock.lock_if_free());
        lock.unlock();
        assert!(lock.lock_if_free());
    }

    #[test]
    fn test_lock_waits_for_unlock() {
        let lock = Arc::new(AdvisoryLock::new());
        lock.lock();
        let shared = Arc::clone(&lock);
        let waiter = thread::spawn(move || {
            shared.lock();
            shared.unlock();
        });
        thread::sleep(Duration::from_millis(20));
        lock.unlock();
        waiter.join().unwrap();
    }
}
