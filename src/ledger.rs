//! User-keyed facade over `StabilityPool`.
//!
//! Owns the depositor records so hosts that keep everything in memory get
//! registration checks and the per-user query surface for free. Hosts that
//! store depositors elsewhere can drive `StabilityPool` directly.

use std::collections::BTreeMap;

use solana_program::{msg, pubkey::Pubkey};

use crate::asset::{Asset, AssetMap};
use crate::error::PoolError;
use crate::pool::{
    DepositEffects, HarvestEffects, LiquidationEffects, StabilityPool, WithdrawEffects,
};
use crate::state::Depositor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StabilityLedger {
    pub pool: StabilityPool,
    depositors: BTreeMap<Pubkey, Depositor>,
}

impl StabilityLedger {
    /// Empty ledger whose HBB issuance counts from `hbb_emissions_start_ts`.
    pub fn new(hbb_emissions_start_ts: u64) -> Self {
        Self {
            pool: StabilityPool::new(hbb_emissions_start_ts),
            depositors: BTreeMap::new(),
        }
    }

    pub fn approve_depositing(&mut self, user: Pubkey) -> Result<&Depositor, PoolError> {
        if self.depositors.contains_key(&user) {
            msg!("Error: user {} already registered", user);
            return Err(PoolError::UserAlreadyRegistered);
        }
        let depositor = self.pool.approve_depositor(user)?;
        Ok(self.depositors.entry(user).or_insert(depositor))
    }

    pub fn depositor(&self, user: &Pubkey) -> Result<&Depositor, PoolError> {
        self.depositors.get(user).ok_or(PoolError::UserNotRegistered)
    }

    pub fn depositors(&self) -> impl Iterator<Item = &Depositor> {
        self.depositors.values()
    }

    pub fn deposit(
        &mut self,
        user: &Pubkey,
        amount: u64,
        now: u64,
    ) -> Result<DepositEffects, PoolError> {
        let depositor = Self::registered(&mut self.depositors, user)?;
        self.pool.deposit(depositor, amount, now)
    }

    pub fn withdraw(
        &mut self,
        user: &Pubkey,
        amount: u64,
        now: u64,
    ) -> Result<WithdrawEffects, PoolError> {
        let depositor = Self::registered(&mut self.depositors, user)?;
        self.pool.withdraw(depositor, amount, now)
    }

    pub fn harvest(&mut self, user: &Pubkey, now: u64) -> Result<HarvestEffects, PoolError> {
        let depositor = Self::registered(&mut self.depositors, user)?;
        self.pool.harvest(depositor, now)
    }

    pub fn liquidate(
        &mut self,
        loss: u64,
        gains: &AssetMap<u64>,
        now: u64,
    ) -> Result<Option<LiquidationEffects>, PoolError> {
        self.pool.liquidate(loss, gains, now)
    }

    pub fn distribute_rewards(
        &mut self,
        rewards: &AssetMap<u64>,
    ) -> Result<Option<AssetMap<u128>>, PoolError> {
        self.pool.distribute_rewards(rewards)
    }

    pub fn issue_hbb(&mut self, now: u64) -> Result<u64, PoolError> {
        self.pool.issue_hbb(now)
    }

    fn registered<'a>(
        depositors: &'a mut BTreeMap<Pubkey, Depositor>,
        user: &Pubkey,
    ) -> Result<&'a mut Depositor, PoolError> {
        match depositors.get_mut(user) {
            Some(depositor) => Ok(depositor),
            None => {
                msg!("Error: user {} not registered", user);
                Err(PoolError::UserNotRegistered)
            }
        }
    }

    // ── Queries ──

    pub fn compounded_balance(&self, user: &Pubkey) -> Result<u64, PoolError> {
        self.pool.compounded_deposit(self.depositor(user)?)
    }

    pub fn pending_gains(&self, user: &Pubkey) -> Result<AssetMap<u64>, PoolError> {
        self.pool.pending_gains(self.depositor(user)?)
    }

    /// Everything the user has earned in `asset`: harvested plus still pending.
    pub fn pending_plus_harvested_gain(&self, user: &Pubkey, asset: Asset) -> Result<u64, PoolError> {
        let depositor = self.depositor(user)?;
        let pending = self.pool.pending_gains(depositor)?;
        pending[asset]
            .checked_add(depositor.cumulative_gains[asset])
            .ok_or(PoolError::ArithmeticOverflow)
    }

    pub fn total_deposits(&self) -> u64 {
        self.pool.total_deposits
    }

    pub fn lifetime_collateral_gained(&self, asset: Asset) -> u64 {
        self.pool.cumulative_gains_total[asset]
    }

    pub fn vault_balance(&self, asset: Asset) -> u64 {
        self.pool.collateral_vault[asset]
    }

    pub fn current_epoch(&self) -> u64 {
        self.pool.current_epoch
    }

    pub fn current_scale(&self) -> u64 {
        self.pool.current_scale
    }

    pub fn product(&self) -> u128 {
        self.pool.p
    }
}
