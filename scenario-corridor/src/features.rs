/*
 *  SPDX-License-Identifier: Apache-2.0 OR MIT
 *  © 2020-2022 ETH Zurich and other contributors, see AUTHORS.txt for details
 */

use rollout_iw_core::{FeatureExtractor, Observed};

use crate::{Corridor, CorridorError, CorridorState};

/// The BASIC features: the tile grid, one atom per cell.
///
/// With these features the corridor has width 2, as going back from the key only
/// revisits atoms already seen on the way there.
#[derive(Copy, Clone, Debug, Default)]
pub struct BasicFeatures;

impl FeatureExtractor<Corridor> for BasicFeatures {
    fn extract(&mut self, corridor: &Corridor, state: &CorridorState) -> Result<Observed, CorridorError> {
        Ok(Observed::new(corridor.basic_features(state)))
    }
}
