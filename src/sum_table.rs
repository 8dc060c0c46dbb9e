//! Epoch → scale → running sum `S` per asset.
//!
//! Append-only: entries are opened lazily (all zero) when the pool moves to a
//! new scale or epoch and are never removed. Within one `(epoch, scale)` every
//! asset sum only grows.

use crate::asset::AssetMap;
use crate::error::PoolError;
use crate::math::U256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochScaleSums {
    epochs: Vec<Vec<AssetMap<U256>>>,
}

impl Default for EpochScaleSums {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochScaleSums {
    /// Table with the single all-zero entry `(0, 0)`.
    pub fn new() -> Self {
        Self {
            epochs: vec![vec![AssetMap::default()]],
        }
    }

    pub fn get(&self, epoch: u64, scale: u64) -> Option<&AssetMap<U256>> {
        let e = usize::try_from(epoch).ok()?;
        let s = usize::try_from(scale).ok()?;
        self.epochs.get(e)?.get(s)
    }

    pub fn num_epochs(&self) -> usize {
        self.epochs.len()
    }

    pub fn num_scales(&self, epoch: u64) -> usize {
        usize::try_from(epoch)
            .ok()
            .and_then(|e| self.epochs.get(e))
            .map_or(0, Vec::len)
    }

    /// Add `delta` to an existing entry.
    pub fn add(&mut self, epoch: u64, scale: u64, delta: &AssetMap<U256>) -> Result<(), PoolError> {
        let entry = usize::try_from(epoch)
            .ok()
            .zip(usize::try_from(scale).ok())
            .and_then(|(e, s)| self.epochs.get_mut(e)?.get_mut(s))
            .ok_or(PoolError::InvalidSumTableKey)?;

        *entry = entry
            .try_zip(*delta, U256::checked_add)
            .ok_or(PoolError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Open a fresh all-zero entry.
    ///
    /// Only two keys are legal: the next scale of the last epoch, or scale 0
    /// of the next epoch.
    pub fn open(&mut self, epoch: u64, scale: u64) -> Result<(), PoolError> {
        let e = usize::try_from(epoch).map_err(|_| PoolError::InvalidSumTableKey)?;
        let s = usize::try_from(scale).map_err(|_| PoolError::InvalidSumTableKey)?;
        let last = self.epochs.len() - 1;

        if e == last && s == self.epochs[last].len() {
            self.epochs[last].push(AssetMap::default());
        } else if e == last + 1 && s == 0 {
            self.epochs.push(vec![AssetMap::default()]);
        } else {
            return Err(PoolError::InvalidSumTableKey);
        }
        Ok(())
    }
}
