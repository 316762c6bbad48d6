//! Subscriber tables for point and collection subscriptions.

use std::collections::HashMap;

use super::delivery::SinkId;
use crate::types::DocKey;

pub(crate) type SubId = u64;

/// One installed subscription: which sink it feeds, under which identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubEntry {
    pub sub: SubId,
    pub sink: SinkId,
}

/// Who cares about what. Entries within a list keep subscription arrival
/// order, which is the delivery order when one record fans out to several
/// subscribers. Subscription identity is the `(key, sink)` or
/// `(collection, sink)` pair; duplicates are rejected by `add_*`.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTables {
    point: HashMap<DocKey, Vec<SubEntry>>,
    collection: HashMap<String, Vec<SubEntry>>,
    next_sub: SubId,
}

impl SubscriptionTables {
    /// Installs a point subscription. Returns `None` when the `(key, sink)`
    /// identity is already subscribed.
    pub fn add_point(
        &mut self,
        key: DocKey,
        sink: SinkId,
    ) -> Option<SubId> {
        if self.point.get(&key).is_some_and(|entries| entries.iter().any(|entry| entry.sink == sink)) {
            return None;
        }
        let sub = self.next();
        self.point.entry(key).or_default().push(SubEntry { sub, sink });
        Some(sub)
    }

    pub fn remove_point(
        &mut self,
        key: &DocKey,
        sink: SinkId,
    ) -> Option<SubId> {
        let entries = self.point.get_mut(key)?;
        let index = entries.iter().position(|entry| entry.sink == sink)?;
        let entry = entries.remove(index);
        if entries.is_empty() {
            self.point.remove(key);
        }
        Some(entry.sub)
    }

    /// Installs a collection subscription. Returns `None` when the
    /// `(collection, sink)` identity is already subscribed.
    pub fn add_collection(
        &mut self,
        collection: String,
        sink: SinkId,
    ) -> Option<SubId> {
        if self.collection.get(&collection).is_some_and(|entries| entries.iter().any(|entry| entry.sink == sink)) {
            return None;
        }
        let sub = self.next();
        self.collection.entry(collection).or_default().push(SubEntry { sub, sink });
        Some(sub)
    }

    pub fn remove_collection(
        &mut self,
        collection: &str,
        sink: SinkId,
    ) -> Option<SubId> {
        let entries = self.collection.get_mut(collection)?;
        let index = entries.iter().position(|entry| entry.sink == sink)?;
        let entry = entries.remove(index);
        if entries.is_empty() {
            self.collection.remove(collection);
        }
        Some(entry.sub)
    }

    pub fn point_subs(
        &self,
        key: &DocKey,
    ) -> &[SubEntry] {
        self.point.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn collection_subs(
        &self,
        collection: &str,
    ) -> &[SubEntry] {
        self.collection
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Keys with at least one point subscription; used for gap recovery.
    pub fn point_keys(&self) -> impl Iterator<Item = &DocKey> {
        self.point.keys()
    }

    /// Drops every subscription feeding `sink`, in both tables.
    pub fn remove_sink(
        &mut self,
        sink: SinkId,
    ) -> Vec<SubId> {
        let mut removed = Vec::new();
        self.point.retain(|_, entries| {
            entries.retain(|entry| {
                if entry.sink == sink {
                    removed.push(entry.sub);
                    false
                } else {
                    true
                }
            });
            !entries.is_empty()
        });
        self.collection.retain(|_, entries| {
            entries.retain(|entry| {
                if entry.sink == sink {
                    removed.push(entry.sub);
                    false
                } else {
                    true
                }
            });
            !entries.is_empty()
        });
        removed
    }

    fn next(&mut self) -> SubId {
        self.next_sub += 1;
        self.next_sub
    }
}
