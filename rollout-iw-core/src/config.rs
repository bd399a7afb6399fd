/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use serde::{Deserialize, Serialize};

use crate::NoveltyGranularity;

/// For how long the novelty table of the planner remembers witnessed atoms.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoveltyScope {
    /// The table is cleared at the start of every planning call,
    /// cached nodes are re-registered unless `ignore_cached_nodes` is set.
    Plan,
    /// The table persists across planning calls on trees of the same lineage,
    /// it is cleared when the planner meets a tree built from scratch or on explicit reset.
    Episode,
}

impl Default for NoveltyScope {
    fn default() -> Self {
        Self::Plan
    }
}

/// The configuration of a Rollout-IW instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RolloutIWConfiguration {
    /// granularity of the novelty table
    pub granularity: NoveltyGranularity,
    /// lifetime of the novelty table
    pub scope: NoveltyScope,
    /// if true, nodes kept from a previous planning call neither consult nor populate the novelty table
    pub ignore_cached_nodes: bool,
    /// if true, terminal nodes neither consult nor populate the novelty table
    pub ignore_terminal_nodes: bool,
    /// optionally, a user-given seed
    pub seed: Option<u64>,
}
