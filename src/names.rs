//! Street-name interning: a single contiguous UTF-8 pool addressed through
//! a prefix-sum offset table.

use std::collections::HashMap;

use crate::NameId;

/// Build side: deduplicates strings, hands out dense ids. The empty string
/// is pre-interned as id 0 so every edge has a valid name id.
#[derive(Debug)]
pub struct NameTableBuilder {
    ids: HashMap<String, NameId>,
    names: Vec<String>,
}

impl NameTableBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            ids: HashMap::new(),
            names: Vec::new(),
        };
        builder.intern("");
        builder
    }

    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as NameId;
        self.ids.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        id
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn build(&self) -> NameTable {
        let mut offsets = Vec::with_capacity(self.names.len() + 1);
        let mut blob = Vec::new();
        offsets.push(0);
        for name in &self.names {
            blob.extend_from_slice(name.as_bytes());
            offsets.push(blob.len() as u32);
        }
        NameTable { offsets, blob }
    }
}

impl Default for NameTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lookup side, also the in-memory image of the `.names` artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTable {
    pub offsets: Vec<u32>,
    pub blob: Vec<u8>,
}

impl NameTable {
    pub fn get(&self, id: NameId) -> &str {
        let start = self.offsets[id as usize] as usize;
        let end = self.offsets[id as usize + 1] as usize;
        std::str::from_utf8(&self.blob[start..end]).expect("name pool holds valid UTF-8")
    }

    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
