/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::{error::Error, process};

use clap::{App, Arg, ArgMatches};

use corridor::{BasicFeatures, Config, Corridor, CorridorHooks};
use rollout_iw_core::graphviz;
use rollout_iw_utils::Executor;

fn parse<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>, Box<dyn Error>>
where
    T: std::str::FromStr,
    T::Err: Error + 'static,
{
    match matches.value_of(name) {
        Some(value) => Ok(Some(value.parse::<T>()?)),
        None => Ok(None),
    }
}

fn value_arg<'a>(name: &'a str, value_name: &'a str, help: &'a str) -> Arg<'a, 'a> {
    Arg::with_name(name)
        .required(false)
        .takes_value(true)
        .value_name(value_name)
        .long(name)
        .help(help)
}

fn run() -> Result<(), Box<dyn Error>> {
    let matches = App::new("Corridor")
        .version("1.0")
        .about("Online planning with Rollout-IW in the key-door corridor")
        .arg(
            Arg::with_name("config")
                .required(false)
                .help("Sets config file path, defaults are used otherwise"),
        )
        .arg(value_arg("seed", "seed", "Sets the random seed").short("s"))
        .arg(value_arg("budget", "nodes", "Sets the tree budget of each planning step").short("b"))
        .arg(value_arg("discount", "factor", "Sets the discount factor"))
        .arg(value_arg("temperature", "temperature", "Sets the softmax temperature, 0 for hard max").short("t"))
        .arg(value_arg("episodes", "count", "Sets the number of episodes to run").short("e"))
        .arg(
            Arg::with_name("no-cache")
                .required(false)
                .takes_value(false)
                .long("no-cache")
                .help("Discards the subtree of the chosen action after each step"),
        )
        .arg(
            Arg::with_name("plot")
                .required(false)
                .takes_value(false)
                .short("p")
                .long("plot")
                .help("Writes the search trees as dot files in the temporary directory"),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(seed) = parse::<u64>(&matches, "seed")? {
        config.planner.seed = Some(seed);
        config.executor.seed = Some(seed);
    }
    if let Some(budget) = parse(&matches, "budget")? {
        config.executor.tree_budget = budget;
    }
    if let Some(discount) = parse(&matches, "discount")? {
        config.executor.discount_factor = discount;
    }
    if let Some(temperature) = parse(&matches, "temperature")? {
        config.executor.temperature = temperature;
    }
    if let Some(episodes) = parse(&matches, "episodes")? {
        config.episodes = episodes;
    }
    if matches.is_present("no-cache") {
        config.executor.cache_subtree = false;
    }
    if matches.is_present("plot") {
        config.analytics.graphs = true;
    }
    graphviz::set_graph_output_depth(config.analytics.graphs_depth);
    log::info!("Configuration: {config:?}");

    let corridor = Corridor::new(&config.corridor)?;
    println!("{corridor}");
    for episode in 0..config.episodes {
        // distinct but reproducible episodes
        let mut planner_config = config.planner.clone();
        planner_config.seed = planner_config.seed.map(|seed| seed.wrapping_add(episode as u64));
        let mut executor_config = config.executor.clone();
        executor_config.seed = executor_config
            .seed
            .map(|seed| seed.wrapping_mul(31).wrapping_add(episode as u64 + 1));

        let mut hooks = CorridorHooks::new(corridor.clone(), episode, config.analytics.graphs);
        let mut executor = Executor::new(
            executor_config,
            planner_config,
            corridor.clone(),
            BasicFeatures,
            &mut hooks,
        );
        executor.reset()?;
        while !executor.is_done() {
            let step = executor.step()?;
            println!("Action: {}. Reward: {:.1}", step.action, step.reward);
        }
        let summary = executor.summary();
        println!("It took {} steps", summary.steps);
        log::info!(
            "Episode {episode}: reward {}, {} node(s) generated{}",
            summary.total_reward,
            summary.nodes_generated,
            if summary.done { "" } else { ", stopped by step limit" }
        );
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("Error: {error}");
        process::exit(1);
    }
}
