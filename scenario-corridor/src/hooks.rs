/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use rollout_iw_core::{SearchTree, Snapshot};
use rollout_iw_utils::{plot_tree_in_tmp, ExecutorHooks, PlanningStep};

use crate::{action_name, Corridor, CorridorState};

/// Logs the corridor after every step and optionally plots the search trees.
pub struct CorridorHooks {
    corridor: Corridor,
    episode: usize,
    step: usize,
    graphs: bool,
}

impl CorridorHooks {
    /// `corridor` is a copy of the simulator, used for rendering.
    pub fn new(corridor: Corridor, episode: usize, graphs: bool) -> Self {
        Self {
            corridor,
            episode,
            step: 0,
            graphs,
        }
    }
}

impl ExecutorHooks<Corridor> for CorridorHooks {
    fn post_plan_hook(&mut self, tree: &SearchTree<Snapshot<Corridor>>, policy: &[f32]) {
        log::debug!("Tree policy: {policy:?}");
        if self.graphs {
            let file_name = format!("episode{:03}_step{:04}", self.episode, self.step);
            if let Err(error) = plot_tree_in_tmp(tree, "corridor_graphs", &file_name) {
                log::warn!("Cannot plot search tree {file_name}: {error}");
            }
        }
    }

    fn post_step_hook(&mut self, step: &PlanningStep<CorridorState>) {
        self.step += 1;
        log::debug!(
            "Executed {} from\n{}",
            action_name(step.action),
            self.corridor.render(&step.observation)
        );
    }
}
