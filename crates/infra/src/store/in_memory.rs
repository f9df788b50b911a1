use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use formadesk_events::{AuditEvent, EntityType};

use super::{AuditLog, EntityStore, StoreError, StoreHealth};

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

/// In-memory entity store for tests/dev.
///
/// Entries are listed in key order; UUIDv7 keys therefore list oldest first.
#[derive(Debug)]
pub struct InMemoryEntityStore<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
}

impl<K, V> InMemoryEntityStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryEntityStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> EntityStore<K, V> for InMemoryEntityStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(key).cloned())
    }

    async fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert(key, value);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().cloned().collect())
    }
}

/// In-memory audit trail; insertion order is the tie-breaker for equal timestamps.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    inner: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, events: &[AuditEvent]) -> Result<(), StoreError> {
        let mut log = self.inner.write().map_err(|_| poisoned())?;
        log.extend_from_slice(events);
        Ok(())
    }

    async fn for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let log = self.inner.read().map_err(|_| poisoned())?;
        let mut records: Vec<AuditEvent> = log
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal timestamps.
        records.sort_by_key(|e| e.occurred_at);
        Ok(records)
    }
}

/// Health probe for the in-memory backend.
#[derive(Debug, Default)]
pub struct InMemoryHealth {
    down: bool,
}

impl InMemoryHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe that always reports the store as unreachable.
    pub fn down() -> Self {
        Self { down: true }
    }
}

#[async_trait]
impl StoreHealth for InMemoryHealth {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.down {
            return Err(StoreError::Unavailable("in-memory store marked down".to_string()));
        }
        Ok(())
    }
}
