//! In-memory cache of ingested message ids.
//!
//! Only a fast-path filter in front of [`LedgerStore::insert_if_absent`]; the
//! store stays authoritative. Rebuilt from the store at startup.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::events::db_storage::LedgerStore;

#[derive(Debug)]
pub struct SeenIds {
    ids: Mutex<HashSet<String>>,
}

impl SeenIds {
    pub fn from_store(store: &LedgerStore) -> Result<Self> {
        Ok(Self {
            ids: Mutex::new(store.known_ids()?),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    /// Mark an id as durably stored.
    pub fn mark(&self, id: &str) {
        self.ids.lock().insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}
