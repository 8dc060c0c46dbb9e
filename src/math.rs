//! Pure fixed-point math for the stability pool. No pool state, no logging.
//!
//! Everything here returns `Option`: `None` means overflow / division by zero
//! and is turned into `PoolError::ArithmeticOverflow` by the pool layer.
//! Kani harnesses in `tests/kani.rs` exercise these functions directly.

#![allow(clippy::assign_op_pattern)]
#![allow(clippy::manual_range_contains)]

use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer, used for the running sums `S`.
    pub struct U256(4);
}

/// Unit value of every per-unit quantity (`P`, loss/gain per unit staked).
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Running product of a fresh epoch.
pub const ONE: u128 = DECIMAL_PRECISION;

/// Rescaling factor applied to `P` when it would drop below this value.
pub const SCALE_FACTOR: u128 = 1_000_000_000;

/// Loss absorbed by one unit of stake, scaled by `DECIMAL_PRECISION`.
///
/// # Returns
/// * `Some(ONE)` - full depletion (`loss == total_deposits`), exact
/// * `Some(0)` - no loss
/// * `Some(floor(loss * ONE / total) + 1)` - otherwise (rounds up)
/// * `None` - empty pool, `loss > total_deposits`, or overflow
///
/// # Invariant
/// Result is in `[0, ONE]`. The `+ 1` means a depositor is charged slightly
/// more loss than exact, never less.
pub fn loss_per_unit_staked(loss: u64, total_deposits: u64) -> Option<u128> {
    if total_deposits == 0 || loss > total_deposits {
        None
    } else if loss == total_deposits {
        Some(ONE)
    } else if loss == 0 {
        Some(0)
    } else {
        (loss as u128)
            .checked_mul(DECIMAL_PRECISION)?
            .checked_div(total_deposits as u128)?
            .checked_add(1)
    }
}

/// Gain credited to one unit of stake, scaled by `DECIMAL_PRECISION`.
///
/// Truncates: the remainder stays in the vault as dust.
pub fn gain_per_unit_staked(gain: u64, total_deposits: u64) -> Option<u128> {
    if total_deposits == 0 {
        return None;
    }
    (gain as u128)
        .checked_mul(DECIMAL_PRECISION)?
        .checked_div(total_deposits as u128)
}

/// Increment of the current `(epoch, scale)` running sum: `gain_per_unit * P`,
/// taken with the product *before* the liquidation updates it.
pub fn sum_increment(gain_per_unit: u128, p: u128) -> Option<U256> {
    U256::from(gain_per_unit).checked_mul(U256::from(p))
}

/// Outcome of folding one loss into the running product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductUpdate {
    /// Nothing survives: open a new epoch, scale 0, `P = ONE`.
    Depleted,
    /// `P` would lose precision: new rescaled product, scale + 1.
    Rescaled(u128),
    /// Ordinary multiplication, same scale.
    Scaled(u128),
}

/// Apply a loss per unit staked to the running product `p`.
///
/// * `factor = ONE - loss_per_unit`; `factor == 0` → `Depleted`
/// * `p * factor / ONE < SCALE_FACTOR` → `Rescaled(p * factor * SCALE_FACTOR / ONE)`
/// * otherwise → `Scaled(p * factor / ONE)`
///
/// A rescale that would truncate the product to zero is reported as
/// `Depleted`: every stake in the epoch is worth nothing at that point.
///
/// # Returns
/// `None` if `loss_per_unit > ONE` or on overflow.
pub fn next_product(p: u128, loss_per_unit: u128) -> Option<ProductUpdate> {
    let factor = ONE.checked_sub(loss_per_unit)?;
    if factor == 0 {
        return Some(ProductUpdate::Depleted);
    }

    // p <= ONE and factor < ONE, so this stays below 1e36
    let raw = p.checked_mul(factor)?;
    let new_p = raw.checked_div(DECIMAL_PRECISION)?;

    if new_p < SCALE_FACTOR {
        let rescaled = raw
            .checked_mul(SCALE_FACTOR)?
            .checked_div(DECIMAL_PRECISION)?;
        if rescaled == 0 {
            Some(ProductUpdate::Depleted)
        } else {
            Some(ProductUpdate::Rescaled(rescaled))
        }
    } else {
        Some(ProductUpdate::Scaled(new_p))
    }
}

/// Compounded value of a stake recorded at `snapshot_p`, `scale_diff` scales ago.
///
/// * `scale_diff == 0`: `deposited * P / P0`
/// * `scale_diff == 1`: `deposited * P / P0 / SCALE_FACTOR`
/// * `scale_diff >= 2`: `0` (decayed below representable precision)
///
/// Rounds down. Caller handles the stale-epoch case (always zero).
pub fn compounded_stake(
    deposited: u64,
    snapshot_p: u128,
    current_p: u128,
    scale_diff: u64,
) -> Option<u64> {
    let base = (deposited as u128)
        .checked_mul(current_p)?
        .checked_div(snapshot_p)?;
    let compounded = match scale_diff {
        0 => base,
        1 => base / SCALE_FACTOR,
        _ => 0,
    };
    u64::try_from(compounded).ok()
}

/// Gain earned by a stake since its snapshot.
///
/// # Arguments
/// * `deposited` - Recorded stake at snapshot time
/// * `sum_delta` - `S[epoch0][scale0] - S0` for this asset
/// * `next_scale_sum` - `S[epoch0][scale0 + 1]` (zero if that scale was never opened)
/// * `snapshot_p` - `P0`
///
/// `gain = deposited * (sum_delta + next_scale_sum / SCALE_FACTOR) / P0 / ONE`,
/// rounded down. Sums more than one scale past the snapshot are ignored.
pub fn pending_gain(
    deposited: u64,
    sum_delta: U256,
    next_scale_sum: U256,
    snapshot_p: u128,
) -> Option<u64> {
    let portion = sum_delta.checked_add(next_scale_sum / U256::from(SCALE_FACTOR))?;
    let gain = portion
        .checked_mul(U256::from(deposited))?
        .checked_div(U256::from(snapshot_p))?
        .checked_div(U256::from(DECIMAL_PRECISION))?;
    if gain > U256::from(u64::MAX) {
        None
    } else {
        Some(gain.low_u64())
    }
}

// ═══════════════════════════════════════════════════════════════
// HBB issuance
// ═══════════════════════════════════════════════════════════════

pub const SECONDS_PER_MINUTE: u64 = 60;

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// HBB base units per token (6 decimals).
pub const HBB_FACTOR: u64 = 1_000_000;

/// Lifetime HBB issued to the pool, in base units.
pub const TOTAL_HBB_TO_STABILITY_POOL: u64 = 31_000_000 * HBB_FACTOR;

/// Per-minute decay `F` with `F^525600 = 0.5`, scaled by `DECIMAL_PRECISION`.
pub const HBB_ISSUANCE_FACTOR: u128 = 999_998_681_227_695_000;

/// `base^exp` in `DECIMAL_PRECISION` fixed point, by squaring. Each product
/// truncates.
pub fn fixed_pow(base: u128, exp: u64) -> Option<u128> {
    let mut base = base;
    let mut exp = exp;
    let mut ret = if exp % 2 != 0 { base } else { ONE };
    while exp > 0 {
        exp /= 2;
        base = base.checked_mul(base)?.checked_div(DECIMAL_PRECISION)?;
        if exp % 2 != 0 {
            ret = ret.checked_mul(base)?.checked_div(DECIMAL_PRECISION)?;
        }
    }
    Some(ret)
}

/// HBB the pool should have received by `now`: half of what remains is
/// issued every year, counted in whole minutes since `start`.
///
/// `TOTAL_HBB_TO_STABILITY_POOL * (1 - F^minutes)`. `None` if `now < start`.
pub fn expected_issuance_since_start(start: u64, now: u64) -> Option<u64> {
    let minutes = now.checked_sub(start)? / SECONDS_PER_MINUTE;
    let remaining = fixed_pow(HBB_ISSUANCE_FACTOR, minutes)?;
    let fraction = ONE.checked_sub(remaining)?;
    let issued = (TOTAL_HBB_TO_STABILITY_POOL as u128)
        .checked_mul(fraction)?
        .checked_div(DECIMAL_PRECISION)?;
    u64::try_from(issued).ok()
}

/// HBB still owed to the pool at `now` given what was already issued.
///
/// Zero before emissions start, and zero if the clock reads earlier than a
/// previous issuance.
pub fn new_hbb_issuance(issued_so_far: u64, start: u64, now: u64) -> u64 {
    expected_issuance_since_start(start, now)
        .map_or(0, |expected| expected.saturating_sub(issued_so_far))
}
