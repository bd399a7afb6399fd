/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

//! This is the core of the Rollout-IW planner, containing the [RolloutIW] algorithm implementation and related abstractions.
//!
//! The planner grows an explicit [SearchTree] rooted at the current state of a black-box simulator,
//! prunes the branches that bring nothing new according to a [NoveltyTable],
//! backs up discounted returns with [compute_return] and extracts an action distribution with [softmax_q_policy].
//! The [TreeActor] owns the live tree and re-roots it when the agent commits to an action,
//! optionally keeping the already-explored subtree for the next planning call.
//!
//! Support features and utilites such as episode loops are available in the `rollout-iw-utils` crate.

mod actor;
mod backup;
mod config;
mod node;
mod novelty;
mod planner;
mod policy;
mod tree;

pub use actor::*;
pub use backup::*;
pub use config::*;
pub use node::*;
pub use novelty::*;
pub use planner::*;
pub use policy::*;
pub use tree::*;

/// An action of the simulator, an index in `0..branching_factor`.
pub type Action = usize;

/// The value of a single feature; features are quantized so that (index, value) pairs can be hashed.
pub type FeatureValue = i32;

/// The identifier of a node in a [SearchTree], essentially a u32.
///
/// Identifiers are stable while the tree grows, but re-rooting renumbers the retained nodes.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);
impl NodeId {
    /// Returns the position of the node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}
