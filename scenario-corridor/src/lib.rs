/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

//! The key-door corridor: online planning with Rollout-IW on BASIC features.
//!
//! The agent has to pick the key and undo its path to open the door.
//! With the tile grid as features this problem has width 2 and cannot be solved
//! in a single planning step, but it can be by re-planning at every real step.

mod config;
mod corridor;
mod features;
mod hooks;

pub use config::*;
pub use corridor::*;
pub use features::*;
pub use hooks::*;
