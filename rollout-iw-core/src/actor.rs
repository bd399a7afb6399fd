/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::fmt;

use crate::{Action, FeatureValue, PlanReport, RolloutIW, SearchTree, Transition, TreeNode};

/// The outcome of a simulator step.
#[derive(Clone, Debug)]
pub struct Step<O> {
    /// what the simulator shows after the step
    pub observation: O,
    /// reward of the transition
    pub reward: f32,
    /// true if the episode ended with this step
    pub done: bool,
}

/// A black-box simulator that can be stepped, saved and restored.
pub trait Simulator {
    /// A full snapshot of the simulator, enough to restore it.
    type State: Clone;
    /// What the simulator returns after a step or reset.
    type Observation: Clone;
    /// The failure of the simulator, propagated unchanged by the planner.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the number of actions, the branching factor of the search tree.
    fn action_count(&self) -> usize;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<Self::Observation, Self::Error>;

    /// Saves the current state.
    fn clone_state(&self) -> Self::State;

    /// Restores a previously saved state.
    fn restore_state(&mut self, state: &Self::State);

    /// Executes `action` from the current state.
    fn step(&mut self, action: Action) -> Result<Step<Self::Observation>, Self::Error>;
}

/// What a feature extractor computes for a state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observed {
    /// the atoms of the state, one value per feature index
    pub features: Vec<FeatureValue>,
    /// optional action probabilities, used as rollout policy
    pub prior: Option<Vec<f32>>,
}

impl Observed {
    /// Features without prior.
    pub fn new(features: Vec<FeatureValue>) -> Self {
        Self {
            features,
            prior: None,
        }
    }
}

/// Maps a freshly reached state to its features, called once per generated node before its novelty test.
pub trait FeatureExtractor<Sim: Simulator> {
    fn extract(&mut self, simulator: &Sim, observation: &Sim::Observation) -> Result<Observed, Sim::Error>;
}

impl<Sim, F> FeatureExtractor<Sim> for F
where
    Sim: Simulator,
    F: FnMut(&Sim, &Sim::Observation) -> Result<Observed, Sim::Error>,
{
    fn extract(&mut self, simulator: &Sim, observation: &Sim::Observation) -> Result<Observed, Sim::Error> {
        self(simulator, observation)
    }
}

/// What the actor stores in each tree node: the simulator state and the observation that came with it.
pub struct Snapshot<Sim: Simulator> {
    /// saved simulator state, restored before generating a child
    pub state: Sim::State,
    /// observation received when reaching this state
    pub observation: Sim::Observation,
}

impl<Sim: Simulator> Clone for Snapshot<Sim> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            observation: self.observation.clone(),
        }
    }
}

impl<Sim: Simulator> fmt::Debug for Snapshot<Sim>
where
    Sim::State: fmt::Debug,
    Sim::Observation: fmt::Debug,
{
    fn fmt(&self, f: &'_ mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("state", &self.state)
            .field("observation", &self.observation)
            .finish()
    }
}

/// The data of a tree root, as returned by [TreeActor::step].
#[derive(Clone, Debug)]
pub struct RootData<O> {
    /// observation received when reaching this root
    pub observation: O,
    /// features of this root
    pub features: Vec<FeatureValue>,
    /// action that led to this root, None for the first state of an episode
    pub action: Option<Action>,
    /// reward of the transition into this root, 0 for the first state of an episode
    pub reward: f32,
    /// true if this root is terminal
    pub done: bool,
}

impl<O: Clone> RootData<O> {
    fn from_node<Sim>(node: &TreeNode<Snapshot<Sim>>) -> Self
    where
        Sim: Simulator<Observation = O>,
    {
        RootData {
            observation: node.state.observation.clone(),
            features: node.features.clone(),
            action: node.action,
            reward: node.reward,
            done: node.done,
        }
    }
}

/// The errors of the tree actor.
#[derive(Debug, thiserror::Error)]
pub enum ActorError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Simulator(#[from] E),
    #[error("the actor has no tree, reset must be called first")]
    NotReset,
    #[error("action {action} is out of range for branching factor {branching_factor}")]
    InvalidAction {
        action: Action,
        branching_factor: usize,
    },
}

/// Owns the simulator and the live search tree, whose root is the current real state.
///
/// The actor provides the successor function of the planner
/// and commits to actions by re-rooting the tree.
pub struct TreeActor<Sim: Simulator, X> {
    simulator: Sim,
    extractor: X,
    tree: Option<SearchTree<Snapshot<Sim>>>,
    nodes_generated: u64,
}

impl<Sim, X> TreeActor<Sim, X>
where
    Sim: Simulator,
    X: FeatureExtractor<Sim>,
{
    /// Creates an actor, [reset](Self::reset) must be called before planning.
    pub fn new(simulator: Sim, extractor: X) -> Self {
        Self {
            simulator,
            extractor,
            tree: None,
            nodes_generated: 0,
        }
    }

    /// Resets the simulator and builds a new single-node tree from its first observation.
    pub fn reset(&mut self) -> Result<&SearchTree<Snapshot<Sim>>, ActorError<Sim::Error>> {
        let observation = self.simulator.reset()?;
        let observed = self.extractor.extract(&self.simulator, &observation)?;
        let state = self.simulator.clone_state();
        let root = Transition {
            state: Snapshot { state, observation },
            reward: 0.,
            done: false,
            features: observed.features,
            prior: observed.prior,
        };
        let tree = SearchTree::new(root, self.simulator.action_count());
        log::debug!("Actor reset, new tree of lineage {}", tree.lineage());
        Ok(self.tree.insert(tree))
    }

    /// Returns the live tree, None before the first reset.
    pub fn tree(&self) -> Option<&SearchTree<Snapshot<Sim>>> {
        self.tree.as_ref()
    }

    /// Returns the live tree mutably, for instance to back up returns.
    pub fn tree_mut(&mut self) -> Option<&mut SearchTree<Snapshot<Sim>>> {
        self.tree.as_mut()
    }

    /// Returns the simulator.
    pub fn simulator(&self) -> &Sim {
        &self.simulator
    }

    /// Returns the number of simulator steps done to generate nodes since the actor was created.
    pub fn nodes_generated(&self) -> u64 {
        self.nodes_generated
    }

    fn generate_successor(
        simulator: &mut Sim,
        extractor: &mut X,
        nodes_generated: &mut u64,
        parent: &TreeNode<Snapshot<Sim>>,
        action: Action,
    ) -> Result<Transition<Snapshot<Sim>>, Sim::Error> {
        simulator.restore_state(&parent.state().state);
        let Step {
            observation,
            reward,
            done,
        } = simulator.step(action)?;
        *nodes_generated += 1;
        let Observed { features, prior } = extractor.extract(simulator, &observation)?;
        Ok(Transition {
            state: Snapshot {
                state: simulator.clone_state(),
                observation,
            },
            reward,
            done,
            features,
            prior,
        })
    }

    /// Grows the live tree with `planner`, using a uniform rollout policy.
    pub fn plan<C>(&mut self, planner: &mut RolloutIW, stop_condition: C) -> Result<PlanReport, ActorError<Sim::Error>>
    where
        C: FnMut(&SearchTree<Snapshot<Sim>>) -> bool,
    {
        self.plan_with_policy(planner, stop_condition, crate::uniform_policy::<Snapshot<Sim>>)
    }

    /// Grows the live tree with `planner`, weighting rollout actions with `policy`.
    pub fn plan_with_policy<C, P>(
        &mut self,
        planner: &mut RolloutIW,
        stop_condition: C,
        policy: P,
    ) -> Result<PlanReport, ActorError<Sim::Error>>
    where
        C: FnMut(&SearchTree<Snapshot<Sim>>) -> bool,
        P: FnMut(&TreeNode<Snapshot<Sim>>, usize) -> Vec<f32>,
    {
        let TreeActor {
            simulator,
            extractor,
            tree,
            nodes_generated,
        } = self;
        let tree = tree.as_mut().ok_or(ActorError::NotReset)?;
        let report = planner.plan_with_policy(
            tree,
            |parent, action| Self::generate_successor(simulator, extractor, nodes_generated, parent, action),
            stop_condition,
            policy,
        )?;
        Ok(report)
    }

    /// Commits to `action`: the root's child for `action` becomes the new root.
    ///
    /// The child is generated first if the planner did not.
    /// If `cache_subtree` is true its subtree is kept, otherwise the new tree holds the child alone.
    /// The simulator is left in the state of the new root.
    /// Returns the data of the previous and of the new root.
    #[allow(clippy::type_complexity)]
    pub fn step(
        &mut self,
        action: Action,
        cache_subtree: bool,
    ) -> Result<(RootData<Sim::Observation>, RootData<Sim::Observation>), ActorError<Sim::Error>> {
        let TreeActor {
            simulator,
            extractor,
            tree,
            nodes_generated,
        } = self;
        let tree = tree.as_mut().ok_or(ActorError::NotReset)?;
        let branching_factor = tree.branching_factor();
        let invalid_action = ActorError::InvalidAction {
            action,
            branching_factor,
        };
        if action >= branching_factor {
            return Err(invalid_action);
        }

        if tree.child(tree.root(), action).is_none() {
            log::debug!("Action {action} was not expanded by the planner, generating it");
            let transition = Self::generate_successor(simulator, extractor, nodes_generated, tree.root_node(), action)?;
            tree.add_child(tree.root(), action, transition);
        }
        let previous = tree.reroot(action, cache_subtree).ok_or(invalid_action)?;
        simulator.restore_state(&tree.root_node().state().state);

        Ok((RootData::from_node(&previous), RootData::from_node(tree.root_node())))
    }
}
