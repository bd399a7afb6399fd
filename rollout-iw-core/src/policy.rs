/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

use crate::{compute_return, Action, SearchTree};

/// Transforms logits into a probability distribution, at the given temperature.
///
/// Logits equal to negative infinity get probability 0.
/// A temperature of zero or below is the hard-max limit: the maximal logits share the probability uniformly.
/// The same holds at any temperature when the maximum is positive infinity.
/// If no logit is finite, the distribution is uniform.
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|logit| !logit.is_nan())
        .fold(f32::NEG_INFINITY, f32::max);
    if logits.is_empty() || max == f32::NEG_INFINITY {
        return vec![1. / logits.len() as f32; logits.len()];
    }

    let weights = if temperature <= 0. || max == f32::INFINITY {
        logits
            .iter()
            .map(|&logit| if logit == max { 1. } else { 0. })
            .collect::<Vec<f32>>()
    } else {
        logits
            .iter()
            .map(|&logit| {
                if logit.is_nan() {
                    0.
                } else {
                    ((logit - max) / temperature).exp()
                }
            })
            .collect::<Vec<f32>>()
    };
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|weight| weight / sum).collect()
}

/// Returns the returns of the root children as a vector indexed by action,
/// negative infinity for actions without child or without computed return.
pub fn root_q_values<S>(tree: &SearchTree<S>, n_actions: usize) -> Vec<f32> {
    let mut q_values = vec![f32::NEG_INFINITY; n_actions];
    for (action, child) in tree.root_node().children() {
        if let (Some(slot), Some(value)) = (q_values.get_mut(action), tree.node(child).value) {
            *slot = value;
        }
    }
    q_values
}

/// Backs up the returns of `tree` and turns the root Q-values into an action distribution.
pub fn softmax_q_policy<S>(
    tree: &mut SearchTree<S>,
    n_actions: usize,
    discount_factor: f32,
    temperature: f32,
) -> Vec<f32> {
    compute_return(tree, discount_factor);
    softmax(&root_q_values(tree, n_actions), temperature)
}

/// Samples an action from a probability mass function.
///
/// Falls back to a uniform choice if the weights are invalid or all zero, returns None if `pmf` is empty.
pub fn sample_pmf<R: Rng>(rng: &mut R, pmf: &[f32]) -> Option<Action> {
    if pmf.is_empty() {
        return None;
    }
    match WeightedIndex::<f32>::new(pmf) {
        Ok(distribution) => Some(distribution.sample(rng)),
        Err(_) => Some(rng.gen_range(0..pmf.len())),
    }
}

/// Returns the root action whose child has the best computed return, the lowest action among ties.
///
/// Returns are read as left by the last backup, children without return are ignored.
pub fn best_action<S>(tree: &SearchTree<S>) -> Option<Action> {
    tree.root_node()
        .children()
        .filter_map(|(action, child)| tree.node(child).value.map(|value| (action, value)))
        .max_by_key(|&(action, value)| (OrderedFloat(value), Reverse(action)))
        .map(|(action, _)| action)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::Transition;

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1., 2., 3.], 1.);
        assert!((p.iter().sum::<f32>() - 1.).abs() < 1e-6);
        assert!(p[0] < p[1] && p[1] < p[2]);
    }

    #[test]
    fn softmax_masks_negative_infinity() {
        let p = softmax(&[f32::NEG_INFINITY, 0., 0.], 0.5);
        assert_close(&p, &[0., 0.5, 0.5]);
    }

    #[test]
    fn zero_temperature_is_hard_max() {
        assert_close(&softmax(&[1., 3., 2.], 0.), &[0., 1., 0.]);
        assert_close(&softmax(&[3., 1., 3.], 0.), &[0.5, 0., 0.5]);
        assert_close(&softmax(&[3., f32::NEG_INFINITY], -1.), &[1., 0.]);
    }

    #[test]
    fn infinite_maximum_is_hard_max() {
        assert_close(&softmax(&[1., f32::INFINITY, 2.], 1.), &[0., 1., 0.]);
        assert_close(
            &softmax(&[f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY], 0.5),
            &[0.5, 0., 0.5],
        );
    }

    #[test]
    fn all_masked_is_uniform() {
        let logits = [f32::NEG_INFINITY; 4];
        assert_close(&softmax(&logits, 1.), &[0.25; 4]);
        assert_close(&softmax(&logits, 0.), &[0.25; 4]);
        assert!(softmax(&[], 1.).is_empty());
    }

    #[test]
    fn sample_pmf_follows_support() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(sample_pmf(&mut rng, &[0., 1., 0.]), Some(1));
        }
        assert!(sample_pmf(&mut rng, &[0., 0.]).is_some());
        assert_eq!(sample_pmf(&mut rng, &[]), None);
    }

    #[test]
    fn best_action_breaks_ties_low() {
        let mut tree = SearchTree::new(Transition::new((), vec![0]), 3);
        for action in 0..3 {
            let reward = if action == 0 { 0. } else { 1. };
            tree.add_child(tree.root(), action, Transition::new((), vec![action as i32]).with_reward(reward));
        }
        assert_eq!(best_action(&tree), None);
        let policy = softmax_q_policy(&mut tree, 3, 0.9, 0.);
        assert_close(&policy, &[0., 0.5, 0.5]);
        assert_eq!(best_action(&tree), Some(1));
    }

    #[test]
    fn missing_children_get_zero_probability() {
        let mut tree = SearchTree::new(Transition::new((), vec![0]), 3);
        tree.add_child(tree.root(), 1, Transition::new((), vec![1]).with_reward(-1.));
        let policy = softmax_q_policy(&mut tree, 3, 0.9, 1.);
        assert_close(&policy, &[0., 1., 0.]);
        assert_eq!(root_q_values(&tree, 3)[1], -1.);
    }
}
