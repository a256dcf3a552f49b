use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Shared stop signal polled by producer loops and the coordinator.
///
/// Cancellation is one-way: once set it stays set. Producers poll
/// `cancelled()` between device reads; the binary parks on
/// `wait_cancellation` until the interrupt handler fires.
#[derive(Debug)]
pub struct SignalOfStop {
    // Shared state between clones
    shared: Arc<SharedState>,
}

#[derive(Debug)]
struct SharedState {
    closing: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            shared: Arc::new(SharedState {
                closing: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.shared.closing.store(true, Ordering::Relaxed);

        // Lock briefly to synchronize with waiting threads
        let _guard = self.shared.mutex.lock().unwrap();
        self.shared.condvar.notify_all();
    }

    pub fn cancelled(&self) -> bool {
        self.shared.closing.load(Ordering::Relaxed)
    }

    pub fn wait_cancellation(&self) {
        let mut guard = self.shared.mutex.lock().unwrap();

        while !self.cancelled() {
            guard = self.shared.condvar.wait(guard).unwrap();
        }
    }

    /// Wait for cancellation up to `timeout`; returns true if cancelled
    pub fn wait_cancellation_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.shared.mutex.lock().unwrap();

        let deadline = std::time::Instant::now() + timeout;
        while !self.cancelled() {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, result) = self
                .shared
                .condvar
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = next;
            if result.timed_out() {
                return self.cancelled();
            }
        }
        true
    }
}

impl Default for SignalOfStop {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SignalOfStop {
    fn clone(&self) -> SignalOfStop {
        SignalOfStop {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let sos = SignalOfStop::new();
        let clone = sos.clone();
        assert!(!clone.cancelled());
        sos.cancel();
        assert!(clone.cancelled());
    }

    #[test]
    fn test_wait_wakes_on_cancel() {
        let sos = SignalOfStop::new();
        let waiter = sos.clone();
        let handle = thread::spawn(move || waiter.wait_cancellation());
        thread::sleep(Duration::from_millis(20));
        sos.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let sos = SignalOfStop::new();
        assert!(!sos.wait_cancellation_timeout(Duration::from_millis(10)));
        sos.cancel();
        assert!(sos.wait_cancellation_timeout(Duration::from_millis(10)));
    }
}
