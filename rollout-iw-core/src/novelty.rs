/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::{fmt, mem};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::FeatureValue;

/// At which granularity the novelty table records witnessed (index, value) pairs, called atoms.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoveltyGranularity {
    /// An atom is seen once witnessed at any depth.
    Global,
    /// Atoms are recorded per depth, (depth, index, value) triples are independent.
    Depth,
    /// Each atom keeps the shallowest depth it was witnessed at,
    /// a node is novel if it reaches an atom at a shallower depth than before.
    ShallowestDepth,
}

impl Default for NoveltyGranularity {
    fn default() -> Self {
        Self::ShallowestDepth
    }
}

/// Records which atoms have been witnessed, the pruning oracle of width-1 search.
///
/// Entries are only ever added, until the table is explicitly cleared.
#[derive(Clone)]
pub struct NoveltyTable {
    granularity: NoveltyGranularity,
    // (depth key, feature index, feature value) -> shallowest depth witnessed
    seen: FxHashMap<(u32, usize, FeatureValue), u32>,
}

impl fmt::Debug for NoveltyTable {
    fn fmt(&self, f: &'_ mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NoveltyTable")
            .field("granularity", &self.granularity)
            .field("entries", &self.seen.len())
            .finish()
    }
}

impl Default for NoveltyTable {
    fn default() -> Self {
        Self::new(NoveltyGranularity::default())
    }
}

impl NoveltyTable {
    /// Creates an empty table.
    pub fn new(granularity: NoveltyGranularity) -> Self {
        NoveltyTable {
            granularity,
            seen: FxHashMap::default(),
        }
    }

    /// Returns the granularity of this table.
    pub fn granularity(&self) -> NoveltyGranularity {
        self.granularity
    }

    /// Forgets all witnessed atoms.
    pub fn clear(&mut self) {
        self.seen.clear();
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns whether no atom was witnessed yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn key(&self, depth: u32, index: usize, value: FeatureValue) -> (u32, usize, FeatureValue) {
        match self.granularity {
            NoveltyGranularity::Depth => (depth, index, value),
            NoveltyGranularity::Global | NoveltyGranularity::ShallowestDepth => (0, index, value),
        }
    }

    /// Returns whether the atom `(index, value)` counts as new for a node at `depth`.
    ///
    /// Nodes that were generated in a previous planning call and are re-registered (`is_new` false)
    /// are also novel when they witnessed the atom at exactly the recorded depth, because that record may be their own.
    pub fn is_novel_atom(&self, depth: u32, index: usize, value: FeatureValue, is_new: bool) -> bool {
        match self.seen.get(&self.key(depth, index, value)) {
            None => true,
            Some(&seen_depth) => {
                self.granularity == NoveltyGranularity::ShallowestDepth
                    && (seen_depth > depth || (!is_new && seen_depth == depth))
            }
        }
    }

    /// Returns whether `features` contain at least one atom that is new at `depth`, without marking anything.
    pub fn is_novel(&self, features: &[FeatureValue], depth: u32, is_new: bool) -> bool {
        features
            .iter()
            .enumerate()
            .any(|(index, &value)| self.is_novel_atom(depth, index, value, is_new))
    }

    /// Marks all atoms of `features` as witnessed at `depth`.
    pub fn mark(&mut self, features: &[FeatureValue], depth: u32) {
        for (index, &value) in features.iter().enumerate() {
            let key = self.key(depth, index, value);
            self.seen
                .entry(key)
                .and_modify(|seen_depth| *seen_depth = (*seen_depth).min(depth))
                .or_insert(depth);
        }
    }

    /// Tests `features` for novelty at `depth` and marks all their atoms as witnessed.
    ///
    /// Marking a node that is not novel leaves the table unchanged,
    /// so marking unconditionally and marking only novel nodes are equivalent.
    pub fn check_and_mark(&mut self, features: &[FeatureValue], depth: u32, is_new: bool) -> bool {
        let novel = self.is_novel(features, depth, is_new);
        if novel {
            self.mark(features, depth);
        }
        novel
    }

    /// Returns whether the atom `(index, value)` was witnessed at `depth` or, depending on granularity, shallower.
    pub fn contains(&self, depth: u32, index: usize, value: FeatureValue) -> bool {
        match self.seen.get(&self.key(depth, index, value)) {
            None => false,
            Some(&seen_depth) => {
                self.granularity != NoveltyGranularity::ShallowestDepth || seen_depth <= depth
            }
        }
    }

    /// The memory footprint of this table.
    pub fn size(&self) -> usize {
        mem::size_of::<Self>()
            + self.seen.len() * mem::size_of::<((u32, usize, FeatureValue), u32)>()
    }
}
