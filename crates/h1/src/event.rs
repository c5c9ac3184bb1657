//! Synchronous event fan-out.
//!
//! Connections and pools report what happens to them as typed events. Observers are
//! called in registration order on the task that fired the event, and never while the
//! observer list itself is locked, so an observer may register further observers.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A registration-ordered list of observers of type `F`, usually a `dyn Fn(&Event)`.
pub struct Observers<F: ?Sized> {
    list: RwLock<Vec<Arc<F>>>,
}

impl<F: ?Sized> Observers<F> {
    pub fn new() -> Self {
        Self { list: RwLock::new(Vec::new()) }
    }

    pub fn add(&self, observer: Arc<F>) {
        self.list.write().unwrap_or_else(PoisonError::into_inner).push(observer);
    }

    /// The observers registered so far. Fire events by iterating over the returned list.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.list.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.list.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: ?Sized> Default for Observers<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Observers<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Observer = dyn Fn(&str) + Send + Sync;

    #[test]
    fn observers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observers = Observers::<Observer>::new();

        for id in 0..3 {
            let seen = Arc::clone(&seen);
            observers.add(Arc::new(move |event: &str| seen.lock().unwrap().push(format!("{id}:{event}"))));
        }

        for observer in observers.snapshot() {
            observer("fired");
        }

        assert_eq!(*seen.lock().unwrap(), ["0:fired", "1:fired", "2:fired"]);
    }

    #[test]
    fn observer_may_register_another() {
        let observers = Arc::new(Observers::<Observer>::new());
        let inner = Arc::clone(&observers);
        observers.add(Arc::new(move |_: &str| inner.add(Arc::new(|_: &str| {}))));

        for observer in observers.snapshot() {
            observer("fired");
        }

        assert_eq!(observers.len(), 2);
    }
}
