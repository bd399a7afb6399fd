/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::{fmt, io};

use rollout_iw_core::{Action, FeatureValue, Simulator, Step};

use crate::CorridorConfig;

pub const NOOP: Action = 0;
pub const UP: Action = 1;
pub const DOWN: Action = 2;
pub const LEFT: Action = 3;
pub const RIGHT: Action = 4;
pub const ACTION_COUNT: usize = 5;

/// The name of an action, for display.
pub fn action_name(action: Action) -> &'static str {
    match action {
        NOOP => "noop",
        UP => "up",
        DOWN => "down",
        LEFT => "left",
        RIGHT => "right",
        _ => "invalid",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CorridorError {
    #[error("invalid map: {0}")]
    InvalidMap(String),
    #[error("the episode is over, the corridor must be reset")]
    EpisodeOver,
    #[error("action {0} does not exist")]
    InvalidAction(Action),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A static tile of the map.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Tile {
    Empty,
    Wall,
    Key,
    Door,
}

// Values of the cells in the BASIC features
const EMPTY_FEATURE: FeatureValue = 0;
const WALL_FEATURE: FeatureValue = 1;
const KEY_FEATURE: FeatureValue = 2;
const DOOR_FEATURE: FeatureValue = 3;
const AGENT_FEATURE: FeatureValue = 4;

/// The dynamic part of the corridor, both the snapshot and the observation of the simulator.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CorridorState {
    /// (x, y), x being the column
    pub agent: (usize, usize),
    pub has_key: bool,
    pub steps: u32,
    pub done: bool,
}

/// A grid world in which the agent must fetch a key and bring it to a door.
///
/// The key is picked up when entering its cell; the door can only be entered with the key,
/// which yields a reward of 1 and ends the episode. Walls and the closed door block moves.
#[derive(Clone, Debug)]
pub struct Corridor {
    tiles: Vec<Tile>,
    width: usize,
    height: usize,
    start: (usize, usize),
    max_steps: Option<u32>,
    step_penalty: f32,
    state: CorridorState,
}

impl Corridor {
    /// Builds a corridor from its configuration, validating the map.
    pub fn new(config: &CorridorConfig) -> Result<Self, CorridorError> {
        let height = config.map.len();
        let width = config.map.first().map_or(0, |row| row.chars().count());
        if width == 0 {
            return Err(CorridorError::InvalidMap("the map is empty".into()));
        }
        let mut tiles = Vec::with_capacity(width * height);
        let mut agents = Vec::new();
        let mut keys = 0;
        for (y, row) in config.map.iter().enumerate() {
            if row.chars().count() != width {
                return Err(CorridorError::InvalidMap(format!(
                    "row {y} has {} tiles instead of {width}",
                    row.chars().count()
                )));
            }
            for (x, c) in row.chars().enumerate() {
                let tile = match c {
                    '#' => Tile::Wall,
                    '.' => Tile::Empty,
                    'K' => {
                        keys += 1;
                        Tile::Key
                    }
                    'D' => Tile::Door,
                    'A' => {
                        agents.push((x, y));
                        Tile::Empty
                    }
                    _ => {
                        return Err(CorridorError::InvalidMap(format!(
                            "unknown tile '{c}' at ({x}, {y})"
                        )))
                    }
                };
                tiles.push(tile);
            }
        }
        let start = match agents.as_slice() {
            [start] => *start,
            _ => {
                return Err(CorridorError::InvalidMap(format!(
                    "expected one agent, found {}",
                    agents.len()
                )))
            }
        };
        if keys != 1 {
            return Err(CorridorError::InvalidMap(format!(
                "expected one key, found {keys}"
            )));
        }
        if !tiles.contains(&Tile::Door) {
            return Err(CorridorError::InvalidMap("no door".into()));
        }

        Ok(Corridor {
            tiles,
            width,
            height,
            start,
            max_steps: config.max_steps,
            step_penalty: config.step_penalty,
            state: CorridorState {
                agent: start,
                has_key: false,
                steps: 0,
                done: false,
            },
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the current dynamic state.
    pub fn state(&self) -> &CorridorState {
        &self.state
    }

    /// Returns the static tile at (x, y), walls outside the map.
    pub fn tile(&self, x: usize, y: usize) -> Tile {
        if x < self.width && y < self.height {
            self.tiles[y * self.width + x]
        } else {
            Tile::Wall
        }
    }

    /// Returns the tile as seen in `state`, the key vanishes once picked.
    fn visible_tile(&self, state: &CorridorState, x: usize, y: usize) -> Tile {
        match self.tile(x, y) {
            Tile::Key if state.has_key => Tile::Empty,
            tile => tile,
        }
    }

    /// The BASIC features of `state`: one value per cell, row by row.
    pub fn basic_features(&self, state: &CorridorState) -> Vec<FeatureValue> {
        let mut features = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let feature = if state.agent == (x, y) {
                    AGENT_FEATURE
                } else {
                    match self.visible_tile(state, x, y) {
                        Tile::Empty => EMPTY_FEATURE,
                        Tile::Wall => WALL_FEATURE,
                        Tile::Key => KEY_FEATURE,
                        Tile::Door => DOOR_FEATURE,
                    }
                };
                features.push(feature);
            }
        }
        features
    }

    /// Renders `state` as text, using the map characters.
    pub fn render(&self, state: &CorridorState) -> String {
        let mut text = String::with_capacity((self.width + 1) * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let c = if state.agent == (x, y) {
                    'A'
                } else {
                    match self.visible_tile(state, x, y) {
                        Tile::Empty => '.',
                        Tile::Wall => '#',
                        Tile::Key => 'K',
                        Tile::Door => 'D',
                    }
                };
                text.push(c);
            }
            text.push('\n');
        }
        text
    }
}

impl fmt::Display for Corridor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&self.state))
    }
}

impl Simulator for Corridor {
    type State = CorridorState;
    type Observation = CorridorState;
    type Error = CorridorError;

    fn action_count(&self) -> usize {
        ACTION_COUNT
    }

    fn reset(&mut self) -> Result<CorridorState, CorridorError> {
        self.state = CorridorState {
            agent: self.start,
            has_key: false,
            steps: 0,
            done: false,
        };
        Ok(self.state.clone())
    }

    fn clone_state(&self) -> CorridorState {
        self.state.clone()
    }

    fn restore_state(&mut self, state: &CorridorState) {
        self.state = state.clone();
    }

    fn step(&mut self, action: Action) -> Result<Step<CorridorState>, CorridorError> {
        if self.state.done {
            return Err(CorridorError::EpisodeOver);
        }
        let (x, y) = self.state.agent;
        let target = match action {
            NOOP => (x, y),
            UP => (x, y.wrapping_sub(1)),
            DOWN => (x, y + 1),
            LEFT => (x.wrapping_sub(1), y),
            RIGHT => (x + 1, y),
            _ => return Err(CorridorError::InvalidAction(action)),
        };

        let mut reward = -self.step_penalty;
        match self.visible_tile(&self.state, target.0, target.1) {
            Tile::Wall => {}
            Tile::Door => {
                if self.state.has_key {
                    self.state.agent = target;
                    self.state.done = true;
                    reward += 1.;
                }
            }
            Tile::Key => {
                self.state.agent = target;
                self.state.has_key = true;
            }
            Tile::Empty => self.state.agent = target,
        }
        self.state.steps += 1;
        if self.max_steps.map_or(false, |max| self.state.steps >= max) {
            self.state.done = true;
        }

        Ok(Step {
            observation: self.state.clone(),
            reward,
            done: self.state.done,
        })
    }
}
