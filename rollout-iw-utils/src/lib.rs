/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

//! This is the utility module of the Rollout-IW planner, containing re-usable driver code.
//!
//! It contains the following features:
//! - An online planning loop, [Executor], that alternates planning, policy extraction and acting,
//!   records each [PlanningStep] and calls user-defined [ExecutorHooks]; [run_episode] is a shortcut for a full episode.
//! - A helper function to plot search trees: [plot_tree_in_tmp].

mod executor;
mod graphs;

pub use executor::*;
pub use graphs::*;
