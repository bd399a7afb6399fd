/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use ansi_term::Style;
use rand::{thread_rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rollout_iw_core::{
    prior_policy, sample_pmf, softmax_q_policy, Action, ActorError, FeatureExtractor, FeatureValue,
    PlanReport, RolloutIW, RolloutIWConfiguration, SearchTree, Simulator, Snapshot, TreeActor,
};
use serde::{Deserialize, Serialize};

fn highlight_style() -> Style {
    ansi_term::Style::new().bold().fg(ansi_term::Colour::Green)
}

fn highlight_step(step: usize) -> String {
    let step_text = format!("S{}", step);
    highlight_style().paint(&step_text).to_string()
}

fn highlight_action(action: Action) -> String {
    let action_text = format!("{}", action);
    highlight_style().paint(&action_text).to_string()
}

/// How the tree budget of each planning step is counted.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetMode {
    /// Plan until the tree, cached nodes included, holds the budget.
    Total,
    /// Plan until the budget of new nodes has been generated.
    Increment,
}

impl Default for BudgetMode {
    fn default() -> Self {
        Self::Total
    }
}

/// The configuration of the online planning loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutorConfiguration {
    /// number of tree nodes per planning step, see [BudgetMode]
    pub tree_budget: usize,
    pub budget_mode: BudgetMode,
    pub discount_factor: f32,
    /// temperature of the softmax over root returns, 0 is hard max
    pub temperature: f32,
    /// whether to keep the subtree of the chosen action for the next step
    pub cache_subtree: bool,
    /// optionally, stop the episode after this many steps
    pub max_steps: Option<usize>,
    /// optionally, a user-given seed for action sampling
    pub seed: Option<u64>,
}

impl Default for ExecutorConfiguration {
    fn default() -> Self {
        Self {
            tree_budget: 30,
            budget_mode: BudgetMode::Total,
            discount_factor: 0.99,
            temperature: 0.,
            cache_subtree: true,
            max_steps: None,
            seed: None,
        }
    }
}

/// The record of a real step: what was observed, what planning recommended and what happened.
///
/// The observation and the target policy are what a learner would train on.
#[derive(Clone, Debug)]
pub struct PlanningStep<O> {
    /// observation at the root when planning started
    pub observation: O,
    /// features of that root
    pub features: Vec<FeatureValue>,
    /// softmax of the root Q-values, one probability per action
    pub target_policy: Vec<f32>,
    /// action sampled from the target policy and executed
    pub action: Action,
    /// reward received for the action
    pub reward: f32,
    /// true if the action ended the episode
    pub done: bool,
    /// outcome of the planning call
    pub report: PlanReport,
    /// size of the tree when the action was chosen
    pub tree_size: usize,
}

/// Statistics of a finished episode.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EpisodeSummary {
    /// number of actions executed
    pub steps: usize,
    /// undiscounted sum of the rewards
    pub total_reward: f32,
    /// whether the episode ended in a terminal state, rather than by reaching the step limit
    pub done: bool,
    /// nodes generated by the actor, see [TreeActor::nodes_generated]
    pub nodes_generated: u64,
}

/// User-defined callbacks of the executor.
pub trait ExecutorHooks<Sim: Simulator> {
    /// Method called after planning, with the tree and the policy extracted from it (by default do nothing)
    fn post_plan_hook(&mut self, _tree: &SearchTree<Snapshot<Sim>>, _policy: &[f32]) {}
    /// Method called after the action is executed, to perform tasks such as rendering or storing the step (by default do nothing)
    fn post_step_hook(&mut self, _step: &PlanningStep<Sim::Observation>) {}
}

impl<Sim: Simulator> ExecutorHooks<Sim> for () {}

/// A single-threaded online planning loop: plan, extract a policy, act, repeat.
pub struct Executor<'a, Sim, X, H>
where
    Sim: Simulator,
    X: FeatureExtractor<Sim>,
    H: ExecutorHooks<Sim>,
{
    config: ExecutorConfiguration,
    actor: TreeActor<Sim, X>,
    planner: RolloutIW,
    hooks: &'a mut H,
    rng: ChaCha8Rng,
    steps: usize,
    total_reward: f32,
    done: bool,
}

impl<'a, Sim, X, H> Executor<'a, Sim, X, H>
where
    Sim: Simulator,
    X: FeatureExtractor<Sim>,
    H: ExecutorHooks<Sim>,
{
    /// Creates a new executor, [reset](Self::reset) must be called before stepping.
    pub fn new(
        config: ExecutorConfiguration,
        planner_config: RolloutIWConfiguration,
        simulator: Sim,
        extractor: X,
        hooks: &'a mut H,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(|| thread_rng().next_u64());
        Self {
            actor: TreeActor::new(simulator, extractor),
            planner: RolloutIW::new(planner_config),
            hooks,
            rng: ChaCha8Rng::seed_from_u64(seed),
            steps: 0,
            total_reward: 0.,
            done: false,
            config,
        }
    }

    /// Starts a new episode.
    pub fn reset(&mut self) -> Result<(), ActorError<Sim::Error>> {
        self.actor.reset()?;
        self.planner.reset_novelty();
        self.steps = 0;
        self.total_reward = 0.;
        self.done = false;
        Ok(())
    }

    /// Plans from the current root, samples an action from the tree policy and executes it.
    pub fn step(&mut self) -> Result<PlanningStep<Sim::Observation>, ActorError<Sim::Error>> {
        let start_size = self
            .actor
            .tree()
            .ok_or(ActorError::NotReset)?
            .len();
        let budget = match self.config.budget_mode {
            BudgetMode::Total => self.config.tree_budget,
            BudgetMode::Increment => start_size + self.config.tree_budget,
        };
        let report = self.actor.plan_with_policy(
            &mut self.planner,
            |tree| tree.len() >= budget,
            prior_policy::<Snapshot<Sim>>,
        )?;

        let tree = self.actor.tree_mut().ok_or(ActorError::NotReset)?;
        let tree_size = tree.len();
        let n_actions = tree.branching_factor();
        let policy = softmax_q_policy(
            tree,
            n_actions,
            self.config.discount_factor,
            self.config.temperature,
        );
        self.hooks.post_plan_hook(tree, &policy);

        let action = sample_pmf(&mut self.rng, &policy).unwrap_or_default();
        let (previous, current) = self.actor.step(action, self.config.cache_subtree)?;
        self.steps += 1;
        self.total_reward += current.reward;
        self.done = current.done;
        if log::log_enabled!(log::Level::Info) {
            log::info!(
                "{} planned with {} node(s) in {:?}, executing action {}: reward {}{}",
                highlight_step(self.steps),
                tree_size,
                self.planner.time(),
                highlight_action(action),
                current.reward,
                if current.done { ", episode done" } else { "" }
            );
        }

        let record = PlanningStep {
            observation: previous.observation,
            features: previous.features,
            target_policy: policy,
            action,
            reward: current.reward,
            done: current.done,
            report,
            tree_size,
        };
        self.hooks.post_step_hook(&record);
        Ok(record)
    }

    /// Returns whether the episode is over, because of a terminal state or of the step limit.
    pub fn is_done(&self) -> bool {
        self.done || self.config.max_steps.map_or(false, |max| self.steps >= max)
    }

    /// Runs a full episode from a reset, returning the recorded steps.
    pub fn run(
        &mut self,
    ) -> Result<(EpisodeSummary, Vec<PlanningStep<Sim::Observation>>), ActorError<Sim::Error>> {
        self.reset()?;
        let mut records = Vec::new();
        while !self.is_done() {
            records.push(self.step()?);
        }
        Ok((self.summary(), records))
    }

    /// Returns the statistics of the current episode.
    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary {
            steps: self.steps,
            total_reward: self.total_reward,
            done: self.done,
            nodes_generated: self.actor.nodes_generated(),
        }
    }

    /// Returns the actor, which owns the simulator and the live tree.
    pub fn actor(&self) -> &TreeActor<Sim, X> {
        &self.actor
    }

    /// Returns the planner.
    pub fn planner(&self) -> &RolloutIW {
        &self.planner
    }

    /// Returns the executor configuration.
    pub fn config(&self) -> &ExecutorConfiguration {
        &self.config
    }
}

/// Runs one episode of online planning without hooks.
#[allow(clippy::type_complexity)]
pub fn run_episode<Sim, X>(
    config: ExecutorConfiguration,
    planner_config: RolloutIWConfiguration,
    simulator: Sim,
    extractor: X,
) -> Result<(EpisodeSummary, Vec<PlanningStep<Sim::Observation>>), ActorError<Sim::Error>>
where
    Sim: Simulator,
    X: FeatureExtractor<Sim>,
{
    let mut hooks = ();
    Executor::new(config, planner_config, simulator, extractor, &mut hooks).run()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use rollout_iw_core::{Observed, Step};

    use super::*;

    // A chain of cells, reward on reaching the last one
    struct Chain {
        cell: u8,
        length: u8,
    }

    impl Simulator for Chain {
        type State = u8;
        type Observation = u8;
        type Error = Infallible;

        fn action_count(&self) -> usize {
            2
        }

        fn reset(&mut self) -> Result<u8, Infallible> {
            self.cell = 0;
            Ok(0)
        }

        fn clone_state(&self) -> u8 {
            self.cell
        }

        fn restore_state(&mut self, state: &u8) {
            self.cell = *state;
        }

        fn step(&mut self, action: Action) -> Result<Step<u8>, Infallible> {
            if action == 1 {
                self.cell = (self.cell + 1).min(self.length);
            } else {
                self.cell = self.cell.saturating_sub(1);
            }
            let done = self.cell == self.length;
            Ok(Step {
                observation: self.cell,
                reward: if done { 1. } else { 0. },
                done,
            })
        }
    }

    fn observe(_chain: &Chain, cell: &u8) -> Result<Observed, Infallible> {
        Ok(Observed::new(vec![*cell as FeatureValue]))
    }

    #[derive(Default)]
    struct Counter {
        plans: usize,
        steps: usize,
    }

    impl ExecutorHooks<Chain> for Counter {
        fn post_plan_hook(&mut self, tree: &SearchTree<Snapshot<Chain>>, policy: &[f32]) {
            assert_eq!(policy.len(), tree.branching_factor());
            self.plans += 1;
        }

        fn post_step_hook(&mut self, step: &PlanningStep<u8>) {
            assert!((step.target_policy.iter().sum::<f32>() - 1.).abs() < 1e-5);
            self.steps += 1;
        }
    }

    fn seeded() -> (ExecutorConfiguration, RolloutIWConfiguration) {
        (
            ExecutorConfiguration {
                tree_budget: 20,
                seed: Some(0),
                ..Default::default()
            },
            RolloutIWConfiguration {
                seed: Some(0),
                ..Default::default()
            },
        )
    }

    #[test]
    fn reaches_end_of_chain() {
        env_logger::builder().is_test(true).try_init().ok();
        let (config, planner_config) = seeded();
        let mut hooks = Counter::default();
        let mut executor = Executor::new(
            config,
            planner_config,
            Chain { cell: 0, length: 5 },
            observe,
            &mut hooks,
        );
        let (summary, records) = executor.run().unwrap();
        assert!(summary.done);
        assert_eq!(summary.steps, 5);
        assert_eq!(summary.total_reward, 1.);
        assert!(records.iter().all(|record| record.action == 1));
        assert_eq!(records[0].observation, 0);
        assert!(records.last().unwrap().done);
        assert_eq!(hooks.plans, 5);
        assert_eq!(hooks.steps, 5);
    }

    #[test]
    fn step_limit() {
        let (mut config, planner_config) = seeded();
        config.max_steps = Some(2);
        config.tree_budget = 2;
        config.budget_mode = BudgetMode::Increment;
        let (summary, records) =
            run_episode(config, planner_config, Chain { cell: 0, length: 50 }, observe).unwrap();
        assert!(!summary.done);
        assert_eq!(summary.steps, 2);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.report.expansions == 2));
    }

    #[test]
    fn must_reset_first() {
        let (config, planner_config) = seeded();
        let mut hooks = ();
        let mut executor = Executor::new(
            config,
            planner_config,
            Chain { cell: 0, length: 5 },
            observe,
            &mut hooks,
        );
        assert!(matches!(executor.step(), Err(ActorError::NotReset)));
    }
}
