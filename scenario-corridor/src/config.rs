/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::{fs, path::Path};

use rollout_iw_core::{graphviz, RolloutIWConfiguration};
use rollout_iw_utils::ExecutorConfiguration;
use serde::{Deserialize, Serialize};

use crate::CorridorError;

/// The corridor world, as rows of tiles: `#` wall, `.` empty, `K` key, `D` door, `A` agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CorridorConfig {
    pub map: Vec<String>,
    /// the episode ends after this many steps, without reward
    pub max_steps: Option<u32>,
    /// subtracted from the reward at each step
    pub step_penalty: f32,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        CorridorConfig {
            map: vec![
                "##########".into(),
                "#D...A..K#".into(),
                "##########".into(),
            ],
            max_steps: None,
            step_penalty: 0.,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AnalyticsConfig {
    /// write the search tree of every step as a dot file in the temporary directory
    pub graphs: bool,
    pub graphs_depth: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            graphs: false,
            graphs_depth: graphviz::get_graph_output_depth(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default = "episodes_default")]
    pub episodes: usize,
    #[serde(default = "Default::default")]
    pub corridor: CorridorConfig,
    #[serde(default = "planner_default")]
    pub planner: RolloutIWConfiguration,
    #[serde(default = "Default::default")]
    pub executor: ExecutorConfiguration,
    #[serde(default = "Default::default")]
    pub analytics: AnalyticsConfig,
}

fn episodes_default() -> usize {
    1
}

// Cached nodes neither consult nor populate the novelty table
fn planner_default() -> RolloutIWConfiguration {
    RolloutIWConfiguration {
        ignore_cached_nodes: true,
        ..Default::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            episodes: episodes_default(),
            corridor: Default::default(),
            planner: planner_default(),
            executor: Default::default(),
            analytics: Default::default(),
        }
    }
}

impl Config {
    /// Parses a configuration from JSON, missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, CorridorError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorridorError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
