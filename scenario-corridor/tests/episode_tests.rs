/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use corridor::{BasicFeatures, Config, Corridor, LEFT, RIGHT};
use rollout_iw_utils::{run_episode, Executor};

fn load(name: &str) -> Config {
    Config::load(format!("{}/configs/{name}.json", env!("CARGO_MANIFEST_DIR"))).unwrap()
}

fn seeded(name: &str) -> Config {
    let mut config = load(name);
    config.planner.seed = Some(0);
    config.executor.seed = Some(0);
    config
}

#[test]
fn configs_are_valid() {
    for name in ["default", "small"] {
        let config = load(name);
        Corridor::new(&config.corridor).unwrap();
    }
    let config = load("default");
    assert!(config.planner.ignore_cached_nodes);
    assert_eq!(config.corridor.max_steps, Some(500));
}

#[test]
fn small_corridor_is_solved_optimally() {
    env_logger::builder().is_test(true).try_init().ok();
    for cache_subtree in [true, false] {
        let mut config = seeded("small");
        config.executor.cache_subtree = cache_subtree;
        let corridor = Corridor::new(&config.corridor).unwrap();
        let (summary, records) =
            run_episode(config.executor, config.planner, corridor, BasicFeatures).unwrap();
        assert!(summary.done);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.total_reward, 1.);
        let actions = records.iter().map(|record| record.action).collect::<Vec<_>>();
        assert_eq!(actions, vec![RIGHT, LEFT, LEFT]);
        assert_eq!(records[0].observation.agent, (2, 1));
        assert!(records[1].observation.has_key);
    }
}

#[test]
fn default_corridor_respects_step_limit() {
    let mut config = seeded("default");
    config.executor.max_steps = Some(20);
    let corridor = Corridor::new(&config.corridor).unwrap();
    let mut hooks = ();
    let mut executor = Executor::new(
        config.executor,
        config.planner,
        corridor,
        BasicFeatures,
        &mut hooks,
    );
    let (summary, records) = executor.run().unwrap();
    assert!(summary.steps <= 20);
    assert_eq!(records.len(), summary.steps);
    assert_eq!(records[0].observation.agent, (5, 1));
    assert_eq!(records[0].features.len(), 30);
    for record in &records {
        assert_eq!(record.target_policy.len(), 5);
        assert!((record.target_policy.iter().sum::<f32>() - 1.).abs() < 1e-5);
        assert!(record.target_policy[record.action] > 0.);
    }
    assert!(summary.nodes_generated >= summary.steps as u64);
}
