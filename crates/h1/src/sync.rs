//! A mutex that reports being held for too long.
//!
//! The locks in this crate guard short bookkeeping sections and are never held across an
//! `.await`. A guard outliving the deadlock timeout means a bug, so it is logged loudly
//! with the lock name. The work itself is left alone.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::error;

pub struct DeadlockMutex<T> {
    inner: Mutex<T>,
    name: &'static str,
    timeout: Duration,
}

impl<T> DeadlockMutex<T> {
    pub fn new(name: &'static str, timeout: Duration, value: T) -> Self {
        Self { inner: Mutex::new(value), name, timeout }
    }

    /// Locks the mutex. A poisoned lock is recovered, since every section guarded by it
    /// leaves the data consistent between statements.
    pub fn lock(&self) -> DeadlockGuard<'_, T> {
        let requested = Instant::now();
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let waited = requested.elapsed();
        if waited > self.timeout {
            error!(lock = self.name, ?waited, timeout = ?self.timeout, "lock acquisition exceeded the deadlock timeout");
        }

        DeadlockGuard { guard, name: self.name, timeout: self.timeout, acquired: Instant::now() }
    }
}

impl<T: fmt::Debug> fmt::Debug for DeadlockMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlockMutex").field("name", &self.name).field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

pub struct DeadlockGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    name: &'static str,
    timeout: Duration,
    acquired: Instant,
}

impl<T> Deref for DeadlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for DeadlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for DeadlockGuard<'_, T> {
    fn drop(&mut self) {
        let held = self.acquired.elapsed();
        if held > self.timeout {
            error!(lock = self.name, ?held, timeout = ?self.timeout, "lock held longer than the deadlock timeout");
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DeadlockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlockGuard").field("name", &self.name).field("value", &*self.guard).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_give_access_to_the_value() {
        let mutex = DeadlockMutex::new("test", Duration::from_secs(1), vec![1]);
        mutex.lock().push(2);
        assert_eq!(*mutex.lock(), [1, 2]);
    }

    #[test]
    fn overlong_hold_is_reported_not_fatal() {
        let mutex = DeadlockMutex::new("test", Duration::ZERO, 0);
        {
            let mut guard = mutex.lock();
            *guard += 1;
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(*mutex.lock(), 1);
    }
}
