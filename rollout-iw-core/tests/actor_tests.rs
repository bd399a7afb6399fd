/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use rollout_iw_core::{
    Action, ActorError, FeatureValue, Observed, RolloutIW, RolloutIWConfiguration, SearchTree,
    Simulator, Snapshot, Step, TreeActor,
};

#[derive(Debug, thiserror::Error)]
#[error("the walker fell after {0} step(s)")]
struct Fell(u32);

/// Walks on a line, from 0 to a goal; actions are left, stay and right.
struct Walker {
    position: i32,
    goal: i32,
    steps: u32,
    fail_after: Option<u32>,
}

impl Walker {
    fn new(goal: i32) -> Self {
        Walker {
            position: 0,
            goal,
            steps: 0,
            fail_after: None,
        }
    }
}

impl Simulator for Walker {
    type State = i32;
    type Observation = i32;
    type Error = Fell;

    fn action_count(&self) -> usize {
        3
    }

    fn reset(&mut self) -> Result<i32, Fell> {
        self.position = 0;
        Ok(self.position)
    }

    fn clone_state(&self) -> i32 {
        self.position
    }

    fn restore_state(&mut self, state: &i32) {
        self.position = *state;
    }

    fn step(&mut self, action: Action) -> Result<Step<i32>, Fell> {
        self.steps += 1;
        if self.fail_after.map_or(false, |limit| self.steps > limit) {
            return Err(Fell(self.steps));
        }
        self.position += action as i32 - 1;
        let done = self.position == self.goal;
        Ok(Step {
            observation: self.position,
            reward: if done { 1. } else { 0. },
            done,
        })
    }
}

fn observe(_walker: &Walker, position: &i32) -> Result<Observed, Fell> {
    Ok(Observed::new(vec![*position as FeatureValue]))
}

type WalkerTree = SearchTree<Snapshot<Walker>>;

// (features, children actions) of a subtree, in breadth-first order
fn describe(tree: &WalkerTree, id: rollout_iw_core::NodeId) -> Vec<(Vec<FeatureValue>, Vec<Action>)> {
    tree.iter_breadth_first_from(id)
        .map(|id| {
            let node = tree.node(id);
            (
                node.features().to_vec(),
                node.children().map(|(action, _)| action).collect(),
            )
        })
        .collect()
}

fn planner() -> RolloutIW {
    RolloutIW::new(RolloutIWConfiguration {
        seed: Some(0),
        ..Default::default()
    })
}

#[test]
fn reset_builds_single_node() {
    env_logger::builder().is_test(true).try_init().ok();
    let mut actor = TreeActor::new(Walker::new(3), observe);
    assert!(actor.tree().is_none());
    let tree = actor.reset().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.branching_factor(), 3);
    assert_eq!(tree.root_node().features(), &[0]);
    assert_eq!(tree.root_node().action(), None);
}

#[test]
fn actor_must_be_reset() {
    let mut actor = TreeActor::new(Walker::new(3), observe);
    assert!(matches!(actor.step(0, true), Err(ActorError::NotReset)));
    assert!(matches!(
        actor.plan(&mut planner(), |_| true),
        Err(ActorError::NotReset)
    ));
}

#[test]
fn invalid_action_is_rejected() {
    let mut actor = TreeActor::new(Walker::new(3), observe);
    actor.reset().unwrap();
    assert!(matches!(
        actor.step(3, true),
        Err(ActorError::InvalidAction {
            action: 3,
            branching_factor: 3
        })
    ));
    assert_eq!(actor.tree().unwrap().len(), 1);
}

#[test]
fn step_with_cache_keeps_subtree() {
    let mut actor = TreeActor::new(Walker::new(10), observe);
    actor.reset().unwrap();
    let mut planner = planner();
    let report = actor.plan(&mut planner, |tree| tree.len() >= 20).unwrap();
    assert_eq!(report.expansions as u64, actor.nodes_generated());

    let tree = actor.tree().unwrap();
    let (action, child) = tree.root_node().children().last().unwrap();
    let expected = describe(tree, child);
    let root_features = tree.root_node().features().to_vec();

    let (previous, current) = actor.step(action, true).unwrap();
    assert_eq!(previous.features, root_features);
    assert_eq!(previous.action, None);
    assert_eq!(current.action, Some(action));
    assert_eq!(current.observation, action as i32 - 1);

    let tree = actor.tree().unwrap();
    assert_eq!(describe(tree, tree.root()), expected);
    assert_eq!(tree.len(), expected.len());
    assert_eq!(tree.root_node().depth(), 0);
    assert_eq!(actor.simulator().clone_state(), action as i32 - 1);
}

#[test]
fn step_without_cache_keeps_single_node() {
    let mut actor = TreeActor::new(Walker::new(10), observe);
    actor.reset().unwrap();
    actor.plan(&mut planner(), |tree| tree.len() >= 20).unwrap();
    let action = actor.tree().unwrap().root_node().children().next().unwrap().0;

    let (_, current) = actor.step(action, false).unwrap();
    let tree = actor.tree().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.root_node().features(), current.features.as_slice());
    assert_eq!(tree.root_node().action(), Some(action));
}

#[test]
fn step_generates_missing_child() {
    let mut actor = TreeActor::new(Walker::new(1), observe);
    actor.reset().unwrap();
    assert_eq!(actor.nodes_generated(), 0);
    let (_, current) = actor.step(2, true).unwrap();
    assert_eq!(actor.nodes_generated(), 1);
    assert_eq!(current.observation, 1);
    assert_eq!(current.reward, 1.);
    assert!(current.done);
}

#[test]
fn walking_to_the_goal() {
    let mut actor = TreeActor::new(Walker::new(3), observe);
    actor.reset().unwrap();
    let mut planner = planner();
    let mut done = false;
    let mut steps = 0;
    while !done && steps < 20 {
        actor.plan(&mut planner, |tree| tree.len() >= 100).unwrap();
        let tree = actor.tree_mut().unwrap();
        let policy = rollout_iw_core::softmax_q_policy(tree, 3, 0.9, 0.);
        let action = rollout_iw_core::best_action(tree).unwrap();
        assert!(policy[action] > 0.);
        done = actor.step(action, true).unwrap().1.done;
        steps += 1;
    }
    assert!(done);
    assert_eq!(steps, 3);
}

#[test]
fn simulator_errors_are_propagated() {
    let mut walker = Walker::new(10);
    walker.fail_after = Some(5);
    let mut actor = TreeActor::new(walker, observe);
    actor.reset().unwrap();
    let result = actor.plan(&mut planner(), |tree| tree.len() >= 20);
    assert!(matches!(result, Err(ActorError::Simulator(Fell(6)))));
    assert_eq!(actor.nodes_generated(), 5);
    assert_eq!(actor.tree().unwrap().len(), 6);
}
