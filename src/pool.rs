use solana_program::{msg, pubkey::Pubkey};

use crate::asset::{Asset, AssetMap};
use crate::error::PoolError;
use crate::math::{self, ProductUpdate, DECIMAL_PRECISION, ONE, U256};
use crate::state::{pack_u128, unpack_u128, Depositor, PoolRecord, Snapshot, Stake};
use crate::sum_table::EpochScaleSums;

/// Global pool state. Depositor records live with the host and are passed in
/// by exclusive reference; a liquidation never touches them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityPool {
    /// Sum of all live compounded balances, maintained incrementally
    pub total_deposits: u64,
    pub current_epoch: u64,
    pub current_scale: u64,
    /// Running product, in `(0, ONE]`
    pub p: u128,
    pub epoch_scale_sums: EpochScaleSums,
    /// Gains received and not yet harvested
    pub collateral_vault: AssetMap<u64>,
    /// Lifetime gains received (never decremented). The HBB entry is also
    /// the amount issued so far.
    pub cumulative_gains_total: AssetMap<u64>,
    pub num_users: u64,
    pub active_depositors: u64,
    /// Unix time HBB issuance counts from
    pub hbb_emissions_start_ts: u64,
}

/// How a liquidation moved the running product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationOutcome {
    Ordinary,
    ScaleIncremented,
    EpochIncremented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationEffects {
    pub loss_per_unit_staked: u128,
    pub gain_per_unit_staked: AssetMap<u128>,
    pub outcome: LiquidationOutcome,
}

/// Transfers the host must perform after a deposit:
/// `amount_to_pool` user → pool, each `gains[asset]` vault → user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepositEffects {
    pub amount_to_pool: u64,
    pub gains: AssetMap<u64>,
}

/// Transfers the host must perform after a withdraw:
/// `amount_to_user` pool → user, each `gains[asset]` vault → user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WithdrawEffects {
    pub amount_to_user: u64,
    pub gains: AssetMap<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestEffects {
    pub gains: AssetMap<u64>,
}

/// Settled view of one depositor against the current pool state.
struct Settlement {
    compounded: u64,
    gains: AssetMap<u64>,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self::new(0)
    }
}

impl StabilityPool {
    pub fn new(hbb_emissions_start_ts: u64) -> Self {
        Self {
            total_deposits: 0,
            current_epoch: 0,
            current_scale: 0,
            p: ONE,
            epoch_scale_sums: EpochScaleSums::new(),
            collateral_vault: AssetMap::default(),
            cumulative_gains_total: AssetMap::default(),
            num_users: 0,
            active_depositors: 0,
            hbb_emissions_start_ts,
        }
    }

    /// Register a zero-balance depositor; `user_id` is its registration order.
    pub fn approve_depositor(&mut self, user: Pubkey) -> Result<Depositor, PoolError> {
        let user_id = self.num_users;
        self.num_users = self.num_users.checked_add(1)
            .ok_or(PoolError::ArithmeticOverflow)?;
        msg!("Approved depositor {} as user {}", user, user_id);
        Ok(Depositor::new(user, user_id))
    }

    /// Snapshot of the current `(S, P, scale, epoch)`.
    pub fn snapshot(&self) -> Result<Snapshot, PoolError> {
        let sums = self.epoch_scale_sums
            .get(self.current_epoch, self.current_scale)
            .ok_or(PoolError::InvalidSumTableKey)?;
        Ok(Snapshot {
            sums: *sums,
            product: self.p,
            scale: self.current_scale,
            epoch: self.current_epoch,
        })
    }

    // ═══════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════

    /// Recorded stake after every loss since the depositor's snapshot.
    pub fn compounded_deposit(&self, depositor: &Depositor) -> Result<u64, PoolError> {
        match &depositor.stake {
            Stake::NoStake => Ok(0),
            Stake::Staked { deposited, snapshot } => self.compound(*deposited, snapshot),
        }
    }

    /// Gains accrued since the depositor's snapshot, not yet harvested.
    pub fn pending_gains(&self, depositor: &Depositor) -> Result<AssetMap<u64>, PoolError> {
        match &depositor.stake {
            Stake::NoStake => Ok(AssetMap::default()),
            Stake::Staked { deposited, snapshot } => self.gains_since(*deposited, snapshot),
        }
    }

    fn compound(&self, deposited: u64, snapshot: &Snapshot) -> Result<u64, PoolError> {
        if snapshot.epoch < self.current_epoch {
            return Ok(0);
        }
        if snapshot.epoch > self.current_epoch {
            return Err(PoolError::CorruptRecord);
        }
        let scale_diff = self.current_scale.checked_sub(snapshot.scale)
            .ok_or(PoolError::CorruptRecord)?;
        math::compounded_stake(deposited, snapshot.product, self.p, scale_diff)
            .ok_or(PoolError::ArithmeticOverflow)
    }

    // Uses the snapshot's own epoch even when it is stale, so gains earned up
    // to a depletion are still paid out.
    fn gains_since(&self, deposited: u64, snapshot: &Snapshot) -> Result<AssetMap<u64>, PoolError> {
        let current = self.epoch_scale_sums
            .get(snapshot.epoch, snapshot.scale)
            .ok_or(PoolError::InvalidSumTableKey)?;
        let next_scale = snapshot.scale.checked_add(1)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let next = self.epoch_scale_sums
            .get(snapshot.epoch, next_scale)
            .copied()
            .unwrap_or_default();

        let mut gains = AssetMap::default();
        for asset in Asset::ALL {
            let delta = current[asset].checked_sub(snapshot.sums[asset])
                .ok_or(PoolError::CorruptRecord)?;
            gains[asset] = math::pending_gain(deposited, delta, next[asset], snapshot.product)
                .ok_or(PoolError::ArithmeticOverflow)?;
        }
        Ok(gains)
    }

    fn settle(&self, depositor: &Depositor) -> Result<Settlement, PoolError> {
        match &depositor.stake {
            Stake::NoStake => Ok(Settlement {
                compounded: 0,
                gains: AssetMap::default(),
            }),
            Stake::Staked { deposited, snapshot } => Ok(Settlement {
                compounded: self.compound(*deposited, snapshot)?,
                gains: self.gains_since(*deposited, snapshot)?,
            }),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Depositor operations
    // ═══════════════════════════════════════════════════════════════

    /// Pay out pending gains and rebase the stake to its compounded value.
    pub fn harvest(
        &mut self,
        depositor: &mut Depositor,
        now: u64,
    ) -> Result<HarvestEffects, PoolError> {
        self.issue_hbb(now)?;
        let settlement = self.settle(depositor)?;
        let gains = settlement.gains;
        self.commit(depositor, settlement.compounded, gains, self.total_deposits)?;

        if !gains.is_zero() {
            msg!("Harvested {:?} for user {}", gains.to_array(), depositor.user_id);
        }
        Ok(HarvestEffects { gains })
    }

    pub fn deposit(
        &mut self,
        depositor: &mut Depositor,
        amount: u64,
        now: u64,
    ) -> Result<DepositEffects, PoolError> {
        if amount == 0 {
            msg!("Error: deposit amount must be positive");
            return Err(PoolError::InvalidAmount);
        }
        self.issue_hbb(now)?;

        let settlement = self.settle(depositor)?;
        let new_balance = settlement.compounded.checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let new_total = self.total_deposits.checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow)?;
        self.commit(depositor, new_balance, settlement.gains, new_total)?;

        msg!(
            "Deposited {} for user {}, balance {}, total {}",
            amount, depositor.user_id, new_balance, new_total
        );
        Ok(DepositEffects {
            amount_to_pool: amount,
            gains: settlement.gains,
        })
    }

    /// Withdraw up to `amount`; requests above the compounded balance clamp.
    pub fn withdraw(
        &mut self,
        depositor: &mut Depositor,
        amount: u64,
        now: u64,
    ) -> Result<WithdrawEffects, PoolError> {
        if amount == 0 {
            msg!("Error: withdraw amount must be positive");
            return Err(PoolError::InvalidAmount);
        }
        if !depositor.stake.is_staked() {
            return Ok(WithdrawEffects::default());
        }
        self.issue_hbb(now)?;

        let settlement = self.settle(depositor)?;
        let withdrawn = settlement.compounded.min(amount);
        let new_balance = settlement.compounded - withdrawn;
        let new_total = self.total_deposits.checked_sub(withdrawn)
            .ok_or(PoolError::ArithmeticOverflow)?;
        self.commit(depositor, new_balance, settlement.gains, new_total)?;

        msg!(
            "Withdrew {} of {} requested for user {}, balance {}, total {}",
            withdrawn, amount, depositor.user_id, new_balance, new_total
        );
        Ok(WithdrawEffects {
            amount_to_user: withdrawn,
            gains: settlement.gains,
        })
    }

    /// Apply a settled depositor change. Everything fallible is computed
    /// before the first write.
    fn commit(
        &mut self,
        depositor: &mut Depositor,
        new_balance: u64,
        gains: AssetMap<u64>,
        new_total: u64,
    ) -> Result<(), PoolError> {
        let vault = self.collateral_vault.checked_sub(gains)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let cumulative = depositor.cumulative_gains.checked_add(gains)
            .ok_or(PoolError::ArithmeticOverflow)?;

        let was_staked = depositor.stake.is_staked();
        let stake = if new_balance == 0 {
            Stake::NoStake
        } else {
            Stake::Staked {
                deposited: new_balance,
                snapshot: self.snapshot()?,
            }
        };
        let active = match (was_staked, stake.is_staked()) {
            (false, true) => self.active_depositors.checked_add(1),
            (true, false) => self.active_depositors.checked_sub(1),
            _ => Some(self.active_depositors),
        }
        .ok_or(PoolError::ArithmeticOverflow)?;

        self.collateral_vault = vault;
        self.total_deposits = new_total;
        self.active_depositors = active;
        depositor.cumulative_gains = cumulative;
        depositor.stake = stake;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════
    // Liquidation
    // ═══════════════════════════════════════════════════════════════

    /// Offset `loss` against the pool and distribute the seized `gains`.
    /// HBB owed up to `now` is issued first, at the product before the loss.
    ///
    /// O(number of assets): depositor records are never visited.
    ///
    /// # Returns
    /// * `Ok(None)` - zero loss, nothing to offset
    /// * `Ok(Some(effects))` - per-unit values applied and how `P` moved
    pub fn liquidate(
        &mut self,
        loss: u64,
        gains: &AssetMap<u64>,
        now: u64,
    ) -> Result<Option<LiquidationEffects>, PoolError> {
        if loss == 0 {
            msg!("Liquidation with zero loss ignored");
            return Ok(None);
        }
        if self.total_deposits == 0 {
            msg!("Error: liquidation of {} against an empty pool", loss);
            return Err(PoolError::DistributionWithZeroStake);
        }
        if loss > self.total_deposits {
            msg!(
                "Error: loss {} exceeds total deposits {}",
                loss, self.total_deposits
            );
            return Err(PoolError::LossExceedsDeposits);
        }
        self.issue_hbb(now)?;

        let total = self.total_deposits;
        let loss_per_unit = math::loss_per_unit_staked(loss, total)
            .ok_or(PoolError::ArithmeticOverflow)?;
        // S moves with the product as it was before this loss
        let (gain_per_unit, sum_delta) = self.gain_increments(gains)?;
        let update = math::next_product(self.p, loss_per_unit)
            .ok_or(PoolError::ArithmeticOverflow)?;

        let vault = self.collateral_vault.checked_add(*gains)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let cumulative = self.cumulative_gains_total.checked_add(*gains)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let (epoch, scale, p, outcome) = match update {
            ProductUpdate::Scaled(p) => {
                (self.current_epoch, self.current_scale, p, LiquidationOutcome::Ordinary)
            }
            ProductUpdate::Rescaled(p) => {
                let scale = self.current_scale.checked_add(1)
                    .ok_or(PoolError::ArithmeticOverflow)?;
                (self.current_epoch, scale, p, LiquidationOutcome::ScaleIncremented)
            }
            ProductUpdate::Depleted => {
                let epoch = self.current_epoch.checked_add(1)
                    .ok_or(PoolError::ArithmeticOverflow)?;
                (epoch, 0, DECIMAL_PRECISION, LiquidationOutcome::EpochIncremented)
            }
        };

        self.epoch_scale_sums.add(self.current_epoch, self.current_scale, &sum_delta)?;
        if outcome != LiquidationOutcome::Ordinary {
            self.epoch_scale_sums.open(epoch, scale)?;
        }
        self.current_epoch = epoch;
        self.current_scale = scale;
        self.p = p;
        self.total_deposits = total - loss;
        self.collateral_vault = vault;
        self.cumulative_gains_total = cumulative;

        msg!(
            "Liquidated {} of {}: P={} scale={} epoch={} gains {:?}",
            loss, total, p, scale, epoch, gains.to_array()
        );
        Ok(Some(LiquidationEffects {
            loss_per_unit_staked: loss_per_unit,
            gain_per_unit_staked: gain_per_unit,
            outcome,
        }))
    }

    /// Per-unit gains over the current stake and the matching `S` increments
    /// at the current `P`.
    fn gain_increments(
        &self,
        gains: &AssetMap<u64>,
    ) -> Result<(AssetMap<u128>, AssetMap<U256>), PoolError> {
        let total = self.total_deposits;
        let gain_per_unit = gains
            .try_map(|gain| math::gain_per_unit_staked(gain, total))
            .ok_or(PoolError::ArithmeticOverflow)?;
        let sum_delta = gain_per_unit
            .try_map(|gpu| math::sum_increment(gpu, self.p))
            .ok_or(PoolError::ArithmeticOverflow)?;
        Ok((gain_per_unit, sum_delta))
    }

    // ═══════════════════════════════════════════════════════════════
    // Rewards
    // ═══════════════════════════════════════════════════════════════

    /// Credit `rewards` to current stakers pro rata, with no loss: `S` grows,
    /// `P`, scale and epoch stay put.
    ///
    /// # Returns
    /// * `Ok(None)` - nothing to distribute, or nobody staked to receive it
    /// * `Ok(Some(gain_per_unit))` - rewards moved into the vault
    pub fn distribute_rewards(
        &mut self,
        rewards: &AssetMap<u64>,
    ) -> Result<Option<AssetMap<u128>>, PoolError> {
        if rewards.is_zero() || self.total_deposits == 0 {
            return Ok(None);
        }

        let (gain_per_unit, sum_delta) = self.gain_increments(rewards)?;
        let vault = self.collateral_vault.checked_add(*rewards)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let cumulative = self.cumulative_gains_total.checked_add(*rewards)
            .ok_or(PoolError::ArithmeticOverflow)?;

        self.epoch_scale_sums.add(self.current_epoch, self.current_scale, &sum_delta)?;
        self.collateral_vault = vault;
        self.cumulative_gains_total = cumulative;

        msg!(
            "Distributed rewards {:?} over {}",
            rewards.to_array(), self.total_deposits
        );
        Ok(Some(gain_per_unit))
    }

    /// Issue the HBB the emission curve owes the pool at `now`.
    ///
    /// Nothing is issued while the pool is empty; the next issuance with
    /// stake present catches up in one lump.
    pub fn issue_hbb(&mut self, now: u64) -> Result<u64, PoolError> {
        if self.total_deposits == 0 {
            return Ok(0);
        }
        let amount = math::new_hbb_issuance(
            self.cumulative_gains_total[Asset::Hbb],
            self.hbb_emissions_start_ts,
            now,
        );
        if amount == 0 {
            return Ok(0);
        }
        self.distribute_rewards(&AssetMap::of(Asset::Hbb, amount))?;
        msg!("Issued {} HBB at {}", amount, now);
        Ok(amount)
    }

    // ═══════════════════════════════════════════════════════════════
    // Fixed-layout records
    // ═══════════════════════════════════════════════════════════════

    pub fn to_record(&self) -> PoolRecord {
        PoolRecord {
            product: pack_u128(self.p),
            total_deposits: self.total_deposits,
            current_epoch: self.current_epoch,
            current_scale: self.current_scale,
            num_users: self.num_users,
            active_depositors: self.active_depositors,
            hbb_emissions_start_ts: self.hbb_emissions_start_ts,
            collateral_vault: self.collateral_vault.to_array(),
            cumulative_gains_total: self.cumulative_gains_total.to_array(),
            _reserved: [0; 8],
        }
    }

    /// Rebuild a pool from its scalar record and its sum table.
    ///
    /// The table's last entry must be the record's current `(epoch, scale)`.
    pub fn from_record(record: &PoolRecord, sums: EpochScaleSums) -> Result<Self, PoolError> {
        let p = unpack_u128(record.product);
        if p == 0 || p > ONE {
            return Err(PoolError::CorruptRecord);
        }
        let epochs = usize::try_from(record.current_epoch)
            .ok()
            .and_then(|epoch| epoch.checked_add(1))
            .ok_or(PoolError::CorruptRecord)?;
        let scales = usize::try_from(record.current_scale)
            .ok()
            .and_then(|scale| scale.checked_add(1))
            .ok_or(PoolError::CorruptRecord)?;
        if sums.num_epochs() != epochs || sums.num_scales(record.current_epoch) != scales {
            return Err(PoolError::CorruptRecord);
        }
        if record.active_depositors > record.num_users {
            return Err(PoolError::CorruptRecord);
        }

        Ok(Self {
            total_deposits: record.total_deposits,
            current_epoch: record.current_epoch,
            current_scale: record.current_scale,
            p,
            epoch_scale_sums: sums,
            collateral_vault: AssetMap::from_array(record.collateral_vault),
            cumulative_gains_total: AssetMap::from_array(record.cumulative_gains_total),
            num_users: record.num_users,
            active_depositors: record.active_depositors,
            hbb_emissions_start_ts: record.hbb_emissions_start_ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pool() {
        let pool = StabilityPool::new(0);
        assert_eq!(pool.p, ONE);
        assert_eq!(pool.total_deposits, 0);
        let snap = pool.snapshot().unwrap();
        assert_eq!(snap.product, ONE);
        assert_eq!((snap.epoch, snap.scale), (0, 0));
    }

    #[test]
    fn test_user_ids_are_sequential() {
        let mut pool = StabilityPool::new(0);
        let a = pool.approve_depositor(Pubkey::new_from_array([1; 32])).unwrap();
        let b = pool.approve_depositor(Pubkey::new_from_array([2; 32])).unwrap();
        assert_eq!((a.user_id, b.user_id), (0, 1));
        assert_eq!(pool.num_users, 2);
    }

    #[test]
    fn test_failed_liquidation_leaves_state() {
        let mut pool = StabilityPool::new(0);
        let mut d = pool.approve_depositor(Pubkey::new_from_array([1; 32])).unwrap();
        pool.deposit(&mut d, 100, 0).unwrap();
        let before = pool.clone();
        assert_eq!(
            pool.liquidate(101, &AssetMap::of(Asset::Sol, 5), 0),
            Err(PoolError::LossExceedsDeposits)
        );
        assert_eq!(pool, before);
    }

    #[test]
    fn test_record_roundtrip_after_rescale() {
        let mut pool = StabilityPool::new(0);
        let mut d = pool.approve_depositor(Pubkey::new_from_array([1; 32])).unwrap();
        pool.deposit(&mut d, 1_000_000_000_000_000, 0).unwrap();
        pool.liquidate(999_999_999_000_000, &AssetMap::of(Asset::Sol, 1_000), 0).unwrap();
        assert_eq!(pool.current_scale, 1);

        let restored = StabilityPool::from_record(&pool.to_record(), pool.epoch_scale_sums.clone()).unwrap();
        assert_eq!(restored, pool);
    }

    #[test]
    fn test_from_record_rejects_mismatched_table() {
        let mut record = StabilityPool::new(0).to_record();
        record.current_scale = 1;
        assert_eq!(
            StabilityPool::from_record(&record, EpochScaleSums::new()),
            Err(PoolError::CorruptRecord)
        );

        let mut record = StabilityPool::new(0).to_record();
        record.product = pack_u128(0);
        assert_eq!(
            StabilityPool::from_record(&record, EpochScaleSums::new()),
            Err(PoolError::CorruptRecord)
        );
    }

    #[test]
    fn test_from_record_rejects_max_epoch_and_scale() {
        let mut record = StabilityPool::new(0).to_record();
        record.current_epoch = u64::MAX;
        assert_eq!(
            StabilityPool::from_record(&record, EpochScaleSums::new()),
            Err(PoolError::CorruptRecord)
        );

        let mut record = StabilityPool::new(0).to_record();
        record.current_scale = u64::MAX;
        assert_eq!(
            StabilityPool::from_record(&record, EpochScaleSums::new()),
            Err(PoolError::CorruptRecord)
        );
    }

    #[test]
    fn test_record_keeps_emissions_start() {
        let pool = StabilityPool::new(1_609_459_200);
        let restored = StabilityPool::from_record(&pool.to_record(), pool.epoch_scale_sums.clone()).unwrap();
        assert_eq!(restored.hbb_emissions_start_ts, 1_609_459_200);
    }

    #[test]
    fn test_distribute_rewards_without_stake_is_noop() {
        let mut pool = StabilityPool::new(0);
        let before = pool.clone();
        assert_eq!(pool.distribute_rewards(&AssetMap::of(Asset::Hbb, 1_000)), Ok(None));
        assert_eq!(pool.issue_hbb(86_400), Ok(0));
        assert_eq!(pool, before);
    }

    #[test]
    fn test_distribute_rewards_keeps_product() {
        let mut pool = StabilityPool::new(0);
        let mut d = pool.approve_depositor(Pubkey::new_from_array([1; 32])).unwrap();
        pool.deposit(&mut d, 4_000, 0).unwrap();

        let gpu = pool.distribute_rewards(&AssetMap::of(Asset::Hbb, 1_000)).unwrap().unwrap();
        assert_eq!(gpu[Asset::Hbb], ONE / 4);
        assert_eq!((pool.p, pool.current_scale, pool.current_epoch), (ONE, 0, 0));
        assert_eq!(pool.total_deposits, 4_000);
        assert_eq!(pool.collateral_vault[Asset::Hbb], 1_000);
        assert_eq!(pool.pending_gains(&d).unwrap()[Asset::Hbb], 1_000);
        assert_eq!(pool.compounded_deposit(&d).unwrap(), 4_000);
    }
}
