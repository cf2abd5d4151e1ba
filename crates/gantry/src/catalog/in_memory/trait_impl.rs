//! ResourceCatalog trait implementation for the in-memory backend.

use super::InMemoryCatalog;
use crate::catalog::ResourceCatalog;
use crate::domain::{Edge, ResourceFilter, ResourceId, ResourceRecord, ResourceState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
impl ResourceCatalog for InMemoryCatalog {
    async fn put(&mut self, record: ResourceRecord) -> Result<()> {
        let mut inner = self.lock().await;
        inner.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &ResourceId) -> Result<Option<ResourceRecord>> {
        let inner = self.lock().await;
        Ok(inner.records.get(id).cloned())
    }

    async fn list(&self, filter: &ResourceFilter) -> Result<Vec<ResourceRecord>> {
        let inner = self.lock().await;

        let mut records: Vec<ResourceRecord> = inner
            .records
            .values()
            .filter(|record| {
                if let Some(state) = filter.state {
                    if record.state != state {
                        return false;
                    }
                }

                if let Some(phase) = &filter.phase {
                    if record.phase.as_ref() != Some(phase) {
                        return false;
                    }
                }

                if let Some(resource_type) = &filter.resource_type {
                    if &record.resource_type != resource_type {
                        return false;
                    }
                }

                true
            })
            .cloned()
            .collect();

        // Ascending ID keeps listings deterministic across runs.
        records.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }

        Ok(records)
    }

    async fn update_state(
        &mut self,
        id: &ResourceId,
        state: ResourceState,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ResourceRecord> {
        let mut inner = self.lock().await;

        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| Error::ResourceNotFound(id.clone()))?;

        record.state = state;
        record.last_seen = Utc::now();
        if expires_at.is_some() {
            record.expires_at = expires_at;
        }

        Ok(record.clone())
    }

    async fn add_relationship(&mut self, edge: Edge) -> Result<bool> {
        let mut inner = self.lock().await;
        Ok(inner.insert_relationship(edge))
    }

    async fn dependencies(&self, id: &ResourceId) -> Result<Vec<Edge>> {
        let inner = self.lock().await;
        Ok(inner
            .relationships
            .values()
            .filter(|edge| &edge.source_id == id)
            .cloned()
            .collect())
    }

    async fn dependents(&self, id: &ResourceId) -> Result<Vec<Edge>> {
        let inner = self.lock().await;
        Ok(inner
            .relationships
            .values()
            .filter(|edge| &edge.target_id == id)
            .cloned()
            .collect())
    }

    async fn relationships(&self) -> Result<Vec<Edge>> {
        let inner = self.lock().await;
        Ok(inner.relationships.values().cloned().collect())
    }

    async fn remove_relationships(&mut self, id: &ResourceId) -> Result<usize> {
        let mut inner = self.lock().await;
        let before = inner.relationships.len();
        inner
            .relationships
            .retain(|_, edge| &edge.source_id != id && &edge.target_id != id);
        Ok(before - inner.relationships.len())
    }

    async fn save(&self) -> Result<()> {
        // Ephemeral backend: persistence is layered on by the JSONL wrapper.
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}
