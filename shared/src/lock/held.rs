use courier_error::LockError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Keys held by one locker instance, with the state each lock needs for
/// release. A key maps to `None` while its acquire is still in flight.
pub(crate) struct HeldKeys<T> {
    keys: Mutex<HashMap<String, Option<T>>>,
}

impl<T> HeldKeys<T> {
    pub(crate) fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Option<T>>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key` for an acquire attempt.
    ///
    /// The claim is dropped again unless [`Reservation::fulfil`] is called, so
    /// a failed or cancelled acquire never leaves the key marked as held.
    pub(crate) fn reserve(&self, key: &str) -> Result<Reservation<'_, T>, LockError> {
        let mut map = self.map();
        if map.contains_key(key) {
            return Err(LockError::AlreadyHeld);
        }
        map.insert(key.to_string(), None);

        Ok(Reservation {
            held: self,
            key: key.to_string(),
            fulfilled: false,
        })
    }

    /// Remove a fully acquired key, returning its release state
    pub(crate) fn take(&self, key: &str) -> Option<T> {
        let mut map = self.map();
        match map.get(key) {
            Some(Some(_)) => map.remove(key).flatten(),
            _ => None,
        }
    }
}

pub(crate) struct Reservation<'a, T> {
    held: &'a HeldKeys<T>,
    key: String,
    fulfilled: bool,
}

impl<T> Reservation<'_, T> {
    pub(crate) fn fulfil(mut self, value: T) {
        self.held.map().insert(self.key.clone(), Some(value));
        self.fulfilled = true;
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.held.map().remove(&self.key);
        }
    }
}
