//! Dense index for activity ids.
//!
//! The passes run over `Vec`s indexed by position; ids are only used at the
//! boundaries. Ids are assigned in sorted order so every build of the same
//! input yields the same numbering.

use rustc_hash::FxHashMap;

/// Interned activity position (u32 for compact adjacency lists).
pub type NodeIdx = u32;

#[derive(Debug, Clone, Default)]
pub struct ActivityIndex {
    by_id: FxHashMap<String, NodeIdx>,
    ids: Vec<String>,
}

impl ActivityIndex {
    /// Build an index over `ids`, sorted and de-duplicated.
    pub fn from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Self {
        let mut sorted: Vec<&str> = ids.collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut by_id = FxHashMap::with_capacity_and_hasher(sorted.len(), Default::default());
        let mut owned = Vec::with_capacity(sorted.len());
        for (pos, id) in sorted.into_iter().enumerate() {
            by_id.insert(id.to_string(), pos as NodeIdx);
            owned.push(id.to_string());
        }
        Self { by_id, ids: owned }
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<NodeIdx> {
        self.by_id.get(id).copied()
    }

    /// Id at position `idx`. Panics on an index this table never issued.
    #[inline]
    pub fn id(&self, idx: NodeIdx) -> &str {
        &self.ids[idx as usize]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
