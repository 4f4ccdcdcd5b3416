//! Entity resolution for extracted names and topics.
//!
//! Maps each name the AI pulled out of a day's notes to a catalog id:
//! case-insensitive exact match against the existing catalog reuses the
//! entry, a miss creates one. Resolving the same name twice never creates
//! two entries, within a run or across runs.

use tracing::debug;
use uuid::Uuid;

use crate::domain::{Person, Tag};
use crate::store::{DiaryStore, StoreError};

/// Resolver scoped to one summarization run.
pub struct EntityResolver<'a> {
    store: &'a DiaryStore,
}

impl<'a> EntityResolver<'a> {
    pub fn new(store: &'a DiaryStore) -> Self {
        Self { store }
    }

    /// Resolve extracted people names to catalog ids, creating missing
    /// entries. Blank names are skipped.
    pub async fn resolve_people(&self, names: &[String]) -> Result<Vec<Uuid>, StoreError> {
        let mut people = self.store.people().await?;
        let mut ids = Vec::new();

        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            let normalized = name.to_lowercase();
            if let Some(existing) = people.iter().find(|p| p.name.to_lowercase() == normalized) {
                ids.push(existing.id);
                continue;
            }

            debug!(%name, "Creating new person from extracted name");
            let person = Person::new(name);
            self.store.add_person(&person).await?;
            ids.push(person.id);
            // Track locally so a duplicate later in the same list reuses it
            people.push(person);
        }

        Ok(ids)
    }

    /// Resolve extracted topic names to tag ids, creating missing entries.
    pub async fn resolve_tags(&self, names: &[String]) -> Result<Vec<Uuid>, StoreError> {
        let mut tags = self.store.tags().await?;
        let mut ids = Vec::new();

        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            let normalized = name.to_lowercase();
            if let Some(existing) = tags.iter().find(|t| t.name.to_lowercase() == normalized) {
                ids.push(existing.id);
                continue;
            }

            debug!(%name, "Creating new tag from extracted topic");
            let tag = Tag::new(name);
            self.store.add_tag(&tag).await?;
            ids.push(tag.id);
            tags.push(tag);
        }

        Ok(ids)
    }
}
