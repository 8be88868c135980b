use crate::joycon::JoyCon;
use crate::transport::Transport;
use std::collections::HashMap;
use std::hash::Hash;

/// Explicitly owned set of live controllers, keyed by whatever identifies a
/// device to the host (a HID path, a serial number).
pub struct Registry<K, T: Transport> {
    entries: HashMap<K, JoyCon<T>>,
}

impl<K: Eq + Hash, T: Transport> Registry<K, T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the controller previously stored under the key, which the
    /// caller is expected to dispose.
    pub fn insert(&mut self, key: K, joycon: JoyCon<T>) -> Option<JoyCon<T>> {
        self.entries.insert(key, joycon)
    }

    pub fn get(&self, key: &K) -> Option<&JoyCon<T>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &JoyCon<T>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disposes and forgets the controller. Returns whether it was present.
    pub async fn remove(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(joycon) => {
                joycon.dispose().await;
                true
            }
            None => false,
        }
    }

    pub async fn dispose_all(&mut self) {
        for (_, joycon) in self.entries.drain() {
            joycon.dispose().await;
        }
    }
}

impl<K: Eq + Hash, T: Transport> Default for Registry<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
