/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::fs;

use rollout_iw_core::{graphviz, SearchTree};

/// Plots the search tree in the temporary directory, as `<base_dir_name>/<file_name>.dot`.
pub fn plot_tree_in_tmp<S>(
    tree: &SearchTree<S>,
    base_dir_name: &str,
    file_name: &str,
) -> std::io::Result<()> {
    let temp_dir = std::env::temp_dir().display().to_string();
    let path = format!("{temp_dir}/{base_dir_name}/");
    fs::create_dir_all(&path)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(format!("{path}{file_name}.dot"))?;
    graphviz::plot_search_tree(tree, &mut file)
}
