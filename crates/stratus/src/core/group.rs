//! Node groups and their allocation policies.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::common::Gdx;
use crate::core::container::Element;

/// Per-group preference level for placing new instances. The derived
/// ordering is meaningful: `Preferred < LastResort < Unallocable`, and
/// multi-group allocation sorts candidate groups by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AllocPolicy {
    Preferred,
    LastResort,
    Unallocable,
}

impl AllocPolicy {
    pub fn is_allocable(&self) -> bool {
        *self != AllocPolicy::Unallocable
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub idx: Gdx,
    pub name: String,
    pub alloc_policy: AllocPolicy,
    /// Names of the networks this group is connected to.
    pub networks: BTreeSet<String>,
}

impl Group {
    pub fn new(idx: Gdx, name: &str, alloc_policy: AllocPolicy) -> Self {
        Self {
            idx,
            name: name.to_string(),
            alloc_policy,
            networks: BTreeSet::new(),
        }
    }
}

impl Element for Group {
    fn index(&self) -> usize {
        self.idx
    }

    fn name(&self) -> &str {
        &self.name
    }
}
