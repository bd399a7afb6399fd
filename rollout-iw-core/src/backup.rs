/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use crate::SearchTree;

/// Backs up discounted returns from the leaves to the root.
///
/// Nodes are visited in reverse breadth-first order, so that every child is computed before its parent.
/// A leaf receives its own reward, an internal node its reward plus `discount_factor` times the best return of its children.
/// This includes the root, whose reward is the one received when reaching it.
/// Without structural change in between, calling this twice yields identical returns.
pub fn compute_return<S>(tree: &mut SearchTree<S>, discount_factor: f32) {
    let order = tree.iter_breadth_first_reverse().collect::<Vec<_>>();
    for id in order {
        let node = tree.node(id);
        let best_child = node
            .children()
            .filter_map(|(_, child)| tree.node(child).value)
            .reduce(f32::max);
        let value = match best_child {
            Some(best) => node.reward + discount_factor * best,
            None => node.reward,
        };
        tree.node_mut(id).value = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transition;

    #[test]
    fn single_node_return_is_reward() {
        let mut tree = SearchTree::new(Transition::new((), vec![0]).with_reward(0.5), 2);
        compute_return(&mut tree, 0.9);
        assert_eq!(tree.root_node().return_value(), Some(0.5));
    }

    #[test]
    fn discounted_max() {
        let mut tree = SearchTree::new(Transition::new((), vec![0]), 2);
        let a = tree.add_child(tree.root(), 0, Transition::new((), vec![1]).with_reward(1.));
        let b = tree.add_child(tree.root(), 1, Transition::new((), vec![2]));
        let c = tree.add_child(b, 0, Transition::new((), vec![3]).with_reward(4.));
        compute_return(&mut tree, 0.5);
        assert_eq!(tree.node(c).return_value(), Some(4.));
        assert_eq!(tree.node(b).return_value(), Some(2.));
        assert_eq!(tree.node(a).return_value(), Some(1.));
        assert_eq!(tree.root_node().return_value(), Some(1.));
    }

    #[test]
    fn growing_invalidates_ancestors() {
        let mut tree = SearchTree::new(Transition::new((), vec![0]), 2);
        let a = tree.add_child(tree.root(), 0, Transition::new((), vec![1]));
        compute_return(&mut tree, 1.);
        assert_eq!(tree.root_node().return_value(), Some(0.));
        tree.add_child(a, 1, Transition::new((), vec![2]).with_reward(1.));
        assert_eq!(tree.node(a).return_value(), None);
        assert_eq!(tree.root_node().return_value(), None);
        compute_return(&mut tree, 1.);
        assert_eq!(tree.root_node().return_value(), Some(1.));
    }
}
