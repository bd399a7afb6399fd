/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::{fmt, mem};

use crate::{Action, FeatureValue, NodeId};

/// The outcome of a simulator step, out of which a new node is created.
///
/// This is what a successor function returns: the state snapshot after the step,
/// the reward received on the way, whether the episode ended,
/// and the features (and optional action prior) extracted from the new state.
#[derive(Clone, Debug)]
pub struct Transition<S> {
    /// opaque simulator snapshot
    pub state: S,
    /// reward received when entering the state
    pub reward: f32,
    /// whether the state is terminal
    pub done: bool,
    /// features computed from this state only
    pub features: Vec<FeatureValue>,
    /// optionally, a probability for each action, used as rollout policy
    pub prior: Option<Vec<f32>>,
}

impl<S> Transition<S> {
    /// Creates a non-terminal transition without reward nor prior.
    pub fn new(state: S, features: Vec<FeatureValue>) -> Self {
        Self {
            state,
            reward: 0.,
            done: false,
            features,
            prior: None,
        }
    }

    /// Sets the reward.
    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward = reward;
        self
    }

    /// Sets the terminal flag.
    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    /// Sets the action prior.
    pub fn with_prior(mut self, prior: Vec<f32>) -> Self {
        self.prior = Some(prior);
        self
    }
}

/// A node of the search tree, one reachable (state, depth) pair.
#[derive(Clone)]
pub struct TreeNode<S> {
    pub(crate) state: S,
    pub(crate) features: Vec<FeatureValue>,
    pub(crate) prior: Option<Vec<f32>>,
    pub(crate) action: Option<Action>,
    pub(crate) reward: f32,
    pub(crate) value: Option<f32>, // backed-up return, None if invalidated
    pub(crate) done: bool,
    pub(crate) depth: u32, // relative to the current root
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<Option<NodeId>>, // indexed by action
    pub(crate) pruned: bool, // found not novel
    pub(crate) solved: bool,
}

impl<S: fmt::Debug> fmt::Debug for TreeNode<S> {
    fn fmt(&self, f: &'_ mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("state", &self.state)
            .field("features", &self.features)
            .field("action", &self.action)
            .field("reward", &self.reward)
            .field("value", &self.value)
            .field("done", &self.done)
            .field("depth", &self.depth)
            .field("pruned", &self.pruned)
            .field("solved", &self.solved)
            .finish()
    }
}

impl<S> TreeNode<S> {
    pub(crate) fn new(
        transition: Transition<S>,
        action: Option<Action>,
        parent: Option<NodeId>,
        depth: u32,
        branching_factor: usize,
    ) -> Self {
        let Transition {
            state,
            reward,
            done,
            features,
            prior,
        } = transition;
        TreeNode {
            state,
            features,
            prior,
            action,
            reward,
            value: None,
            done,
            depth,
            parent,
            children: vec![None; branching_factor],
            pruned: false,
            solved: false,
        }
    }

    /// Returns the simulator snapshot of this node.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns the features of this node.
    pub fn features(&self) -> &[FeatureValue] {
        &self.features
    }

    /// Returns the action prior of this node, if the feature extractor provided one.
    pub fn prior(&self) -> Option<&[f32]> {
        self.prior.as_deref()
    }

    /// Returns the action that led to this node, None for the root of a fresh tree.
    pub fn action(&self) -> Option<Action> {
        self.action
    }

    /// Returns the reward received when entering this node.
    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// Returns the discounted return computed by the last backup, None if not computed or invalidated since.
    pub fn return_value(&self) -> Option<f32> {
        self.value
    }

    /// Returns whether the node is terminal.
    pub fn is_terminal(&self) -> bool {
        self.done
    }

    /// Returns whether the planner found this node not novel, making it a dead end.
    pub fn is_pruned(&self) -> bool {
        self.pruned
    }

    /// Returns whether the planner considers this node a dead end in the current planning call.
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// Returns the depth, relative to the current root.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the parent node, None for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns the child reached through `action`, if already generated.
    pub fn child(&self, action: Action) -> Option<NodeId> {
        self.children.get(action).copied().flatten()
    }

    /// Returns the generated children, in action order.
    pub fn children(&self) -> impl Iterator<Item = (Action, NodeId)> + '_ {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(action, child)| child.map(|child| (action, child)))
    }

    /// Returns the number of generated children.
    pub fn expanded_count(&self) -> usize {
        self.children.iter().flatten().count()
    }

    /// Returns whether every action has a generated child.
    pub fn is_fully_expanded(&self) -> bool {
        self.children.iter().all(Option::is_some)
    }

    /// Returns whether the node has no child.
    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Consumes the node and returns its snapshot and features.
    pub fn into_parts(self) -> (S, Vec<FeatureValue>) {
        (self.state, self.features)
    }

    /// The memory footprint of this node, excluding the snapshot's heap data.
    pub fn size(&self) -> usize {
        let mut size = 0;

        size += mem::size_of::<Self>();
        size += self.features.len() * mem::size_of::<FeatureValue>();
        size += self.children.len() * mem::size_of::<Option<NodeId>>();
        if let Some(prior) = &self.prior {
            size += prior.len() * mem::size_of::<f32>();
        }

        size
    }
}
