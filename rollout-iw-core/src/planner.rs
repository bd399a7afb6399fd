/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::time::{Duration, Instant};

use rand::{
    distributions::WeightedIndex,
    prelude::{thread_rng, Distribution, RngCore, SeedableRng},
    Rng,
};
use rand_chacha::ChaCha8Rng;

use crate::*;

/// The outcome of a planning call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanReport {
    /// number of successor calls, which is also the number of new nodes
    pub expansions: usize,
    /// number of rollouts started
    pub rollouts: usize,
    /// true if planning stopped because the root got solved,
    /// i.e. every node reachable under the novelty constraint is expanded
    pub exhausted: bool,
}

/// The uniform rollout policy.
pub fn uniform_policy<S>(_node: &TreeNode<S>, branching_factor: usize) -> Vec<f32> {
    vec![1. / branching_factor as f32; branching_factor]
}

/// A rollout policy using the action prior of the node when the feature extractor provided one, uniform otherwise.
pub fn prior_policy<S>(node: &TreeNode<S>, branching_factor: usize) -> Vec<f32> {
    node.prior()
        .map_or_else(|| uniform_policy(node, branching_factor), <[f32]>::to_vec)
}

/// The state of a Rollout-IW planner instance.
///
/// The planner does not own the tree, it grows the tree it is given.
/// It owns the novelty table, whose lifetime is controlled by the [NoveltyScope] of the configuration.
pub struct RolloutIW {
    // Statistics
    time: Duration,

    // Config
    config: RolloutIWConfiguration,
    seed: u64,

    // Novelty
    novelty_table: NoveltyTable,
    lineage: Option<u64>, // lineage of the tree whose nodes populate the table

    // Rng
    rng: ChaCha8Rng,
}

impl RolloutIW {
    /// Creates a new planner with an empty novelty table.
    pub fn new(config: RolloutIWConfiguration) -> Self {
        let seed = config.seed.unwrap_or_else(|| thread_rng().next_u64());
        RolloutIW {
            time: Duration::default(),
            novelty_table: NoveltyTable::new(config.granularity),
            lineage: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            config,
        }
    }

    /// Grows `tree` until `stop_condition` returns true or the tree is exhausted, with a uniform rollout policy.
    ///
    /// The stop condition is evaluated before every call to `successor`,
    /// so a condition on the size of the tree is met exactly.
    /// An error of `successor` aborts planning and is returned unchanged,
    /// the tree is then left partially expanded but consistent.
    pub fn plan<S, E, F, C>(
        &mut self,
        tree: &mut SearchTree<S>,
        successor: F,
        stop_condition: C,
    ) -> Result<PlanReport, E>
    where
        F: FnMut(&TreeNode<S>, Action) -> Result<Transition<S>, E>,
        C: FnMut(&SearchTree<S>) -> bool,
    {
        self.plan_with_policy(tree, successor, stop_condition, uniform_policy::<S>)
    }

    /// Grows `tree` like [plan](Self::plan), using `policy` to weight action choice during rollouts.
    ///
    /// The policy receives a node and the branching factor and returns one non-negative weight per action.
    /// Actions leading to solved children are excluded and the remaining weights renormalized;
    /// if no weight remains, the choice is uniform among the remaining actions.
    pub fn plan_with_policy<S, E, F, C, P>(
        &mut self,
        tree: &mut SearchTree<S>,
        mut successor: F,
        mut stop_condition: C,
        mut policy: P,
    ) -> Result<PlanReport, E>
    where
        F: FnMut(&TreeNode<S>, Action) -> Result<Transition<S>, E>,
        C: FnMut(&SearchTree<S>) -> bool,
        P: FnMut(&TreeNode<S>, usize) -> Vec<f32>,
    {
        let start = Instant::now();
        self.initialize(tree);

        let mut report = PlanReport::default();
        while !tree.root_node().solved {
            if stop_condition(tree) {
                log::debug!(
                    "Stop condition met after {} expansion(s), tree size {}",
                    report.expansions,
                    tree.len()
                );
                break;
            }
            if let Some((node, action)) = self.select(tree, &mut policy) {
                report.rollouts += 1;
                let outcome = self.rollout(
                    tree,
                    node,
                    action,
                    &mut successor,
                    &mut stop_condition,
                    &mut policy,
                    &mut report,
                );
                if let Err(error) = outcome {
                    self.time = start.elapsed();
                    log::debug!(
                        "Successor failed after {} expansion(s), aborting planning",
                        report.expansions
                    );
                    return Err(error);
                }
            }
        }
        report.exhausted = tree.root_node().solved;
        self.time = start.elapsed();

        if report.exhausted {
            log::info!(
                "Tree exhausted after {} rollout(s), {} new node(s), tree size {}",
                report.rollouts,
                report.expansions,
                tree.len()
            );
        } else {
            log::debug!(
                "Planning done after {} rollout(s), {} new node(s), tree size {}",
                report.rollouts,
                report.expansions,
                tree.len()
            );
        }
        Ok(report)
    }

    /// Resets solved labels and, depending on the scope, the novelty table, then registers the cached nodes.
    fn initialize<S>(&mut self, tree: &mut SearchTree<S>) {
        let fresh_table = match self.config.scope {
            NoveltyScope::Plan => {
                self.novelty_table.clear();
                true
            }
            NoveltyScope::Episode => {
                if self.lineage != Some(tree.lineage()) {
                    log::debug!("New tree lineage {}, clearing novelty table", tree.lineage());
                    self.novelty_table.clear();
                    self.lineage = Some(tree.lineage());
                    true
                } else {
                    false
                }
            }
        };
        let register_cached = fresh_table && !self.config.ignore_cached_nodes;

        let order = tree.iter_breadth_first().collect::<Vec<_>>();
        for &id in &order {
            tree.node_mut(id).solved = false;
        }

        let mut pruned_count = 0;
        for id in order {
            let depth = self.novelty_depth(tree, id);
            let node = tree.node(id);
            let done = node.done;
            let pruned = if register_cached && !(done && self.config.ignore_terminal_nodes) {
                !self
                    .novelty_table
                    .check_and_mark(&node.features, depth, false)
            } else if !fresh_table {
                // the table still holds this lineage, keep earlier verdicts
                node.pruned
            } else {
                false
            };
            tree.node_mut(id).pruned = pruned;
            if done || pruned {
                pruned_count += 1;
                Self::solve(tree, id);
            }
        }
        log::debug!(
            "Initialized planning on {} cached node(s), {} dead end(s), {} atom(s) in novelty table",
            tree.len(),
            pruned_count,
            self.novelty_table.len()
        );
    }

    /// Walks down from the root following the policy among unsolved actions,
    /// until reaching a node without child for the chosen action.
    fn select<S, P>(&mut self, tree: &mut SearchTree<S>, policy: &mut P) -> Option<(NodeId, Action)>
    where
        P: FnMut(&TreeNode<S>, usize) -> Vec<f32>,
    {
        let branching_factor = tree.branching_factor();
        let mut node = tree.root();
        loop {
            let current = tree.node(node);
            let mask = (0..branching_factor)
                .map(|action| {
                    current
                        .child(action)
                        .map_or(true, |child| !tree.node(child).solved)
                })
                .collect::<Vec<_>>();
            let weights = policy(current, branching_factor);
            match self.sample_action(&weights, &mask) {
                Some(action) => match current.child(action) {
                    Some(child) => {
                        log::trace!("D{}\t{node} - Select action: {action}", current.depth);
                        node = child;
                    }
                    None => return Some((node, action)),
                },
                None => {
                    log::debug!("{node} has no unsolved action left, solving it");
                    Self::solve(tree, node);
                    return None;
                }
            }
        }
    }

    /// Expands from `node` through `action`, and keeps on expanding new nodes until
    /// reaching a terminal or non-novel node, or until the stop condition is met.
    #[allow(clippy::too_many_arguments)]
    fn rollout<S, E, F, C, P>(
        &mut self,
        tree: &mut SearchTree<S>,
        mut node: NodeId,
        mut action: Action,
        successor: &mut F,
        stop_condition: &mut C,
        policy: &mut P,
        report: &mut PlanReport,
    ) -> Result<(), E>
    where
        F: FnMut(&TreeNode<S>, Action) -> Result<Transition<S>, E>,
        C: FnMut(&SearchTree<S>) -> bool,
        P: FnMut(&TreeNode<S>, usize) -> Vec<f32>,
    {
        let branching_factor = tree.branching_factor();
        let any_action = vec![true; branching_factor];
        loop {
            let transition = successor(tree.node(node), action)?;
            let child = tree.add_child(node, action, transition);
            report.expansions += 1;

            let depth = self.novelty_depth(tree, child);
            let child_node = tree.node(child);
            let done = child_node.done;
            let novel = if done && self.config.ignore_terminal_nodes {
                true
            } else {
                self.novelty_table
                    .check_and_mark(&child_node.features, depth, true)
            };
            if done || !novel {
                tree.node_mut(child).pruned = !novel;
                log::debug!(
                    "D{depth}\t{node} - Expand action {action}: {child} is {}, rollout ends",
                    if done { "terminal" } else { "not novel" }
                );
                Self::solve(tree, child);
                return Ok(());
            }
            log::debug!("D{depth}\t{node} - Expand action {action}: {child} is novel");

            if stop_condition(tree) {
                return Ok(());
            }

            let weights = policy(tree.node(child), branching_factor);
            match self.sample_action(&weights, &any_action) {
                Some(next_action) => {
                    node = child;
                    action = next_action;
                }
                None => {
                    Self::solve(tree, child);
                    return Ok(());
                }
            }
        }
    }

    /// Marks `id` as solved and propagates to the ancestors whose children are all generated and solved.
    fn solve<S>(tree: &mut SearchTree<S>, id: NodeId) {
        tree.node_mut(id).solved = true;
        let mut current = tree.node(id).parent;
        while let Some(parent) = current {
            let node = tree.node(parent);
            let all_solved = node.is_fully_expanded()
                && node.children().all(|(_, child)| tree.node(child).solved);
            if node.solved || !all_solved {
                break;
            }
            tree.node_mut(parent).solved = true;
            current = tree.node(parent).parent;
        }
    }

    /// Samples an action among the allowed ones, proportionally to the weights.
    fn sample_action(&mut self, weights: &[f32], allowed: &[bool]) -> Option<Action> {
        let masked = allowed
            .iter()
            .enumerate()
            .map(|(action, &allowed)| {
                let weight = weights.get(action).copied().unwrap_or(0.);
                if allowed && weight.is_finite() && weight > 0. {
                    weight
                } else {
                    0.
                }
            })
            .collect::<Vec<f32>>();
        match WeightedIndex::<f32>::new(&masked) {
            Ok(distribution) => Some(distribution.sample(&mut self.rng)),
            Err(_) => {
                let candidates = (0..allowed.len())
                    .filter(|&action| allowed[action])
                    .collect::<Vec<_>>();
                if candidates.is_empty() {
                    None
                } else {
                    Some(candidates[self.rng.gen_range(0..candidates.len())])
                }
            }
        }
    }

    fn novelty_depth<S>(&self, tree: &SearchTree<S>, id: NodeId) -> u32 {
        match self.config.scope {
            NoveltyScope::Plan => tree.node(id).depth,
            NoveltyScope::Episode => tree.absolute_depth(id),
        }
    }

    /// Clears the novelty table, for instance at the start of a new episode.
    pub fn reset_novelty(&mut self) {
        self.novelty_table.clear();
        self.lineage = None;
    }

    /// Returns the novelty table.
    pub fn novelty_table(&self) -> &NoveltyTable {
        &self.novelty_table
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RolloutIWConfiguration {
        &self.config
    }

    /// Returns the seed of the planner.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the duration of the last planning call.
    pub fn time(&self) -> Duration {
        self.time
    }
}
