use async_trait::async_trait;
use dashmap::DashMap;
use indirector_core::{Model, Request};

use super::KeyPattern;
use crate::error::IndirectorResult;
use crate::indirector::Terminus;

/// In-process store implementing all four operations.
///
/// Contents live as long as the instance; an indirection reset discards them.
pub struct MemoryTerminus<M: Model> {
    name: &'static str,
    store: DashMap<String, M>,
}

impl<M: Model> MemoryTerminus<M> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            store: DashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl<M: Model> Terminus<M> for MemoryTerminus<M> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn find(&self, request: &Request<M>) -> IndirectorResult<Option<M>> {
        Ok(self.store.get(request.key()).map(|entry| entry.value().clone()))
    }

    async fn search(&self, request: &Request<M>) -> IndirectorResult<Vec<M>> {
        let pattern = KeyPattern::parse(request.key())?;
        let mut matches: Vec<(String, M)> = self
            .store
            .iter()
            .filter(|entry| pattern.matches(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches.into_iter().map(|(_, instance)| instance).collect())
    }

    async fn save(&self, request: &Request<M>) -> IndirectorResult<()> {
        if let Some(instance) = request.instance() {
            self.store.insert(request.key().to_string(), instance.clone());
        }
        Ok(())
    }

    async fn destroy(&self, request: &Request<M>) -> IndirectorResult<()> {
        self.store.remove(request.key());
        Ok(())
    }
}
