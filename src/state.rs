use bytemuck::{Pod, Zeroable};
use solana_program::pubkey::Pubkey;

use crate::asset::{Asset, AssetMap};
use crate::error::PoolError;
use crate::math::U256;

/// Pool state captured when a depositor last settled.
///
/// Copied by value: later liquidations never alter a recorded snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// `S[epoch][scale]` per asset at capture time
    pub sums: AssetMap<U256>,
    /// Running product `P` at capture time
    pub product: u128,
    pub scale: u64,
    pub epoch: u64,
}

/// A depositor's recorded stake.
///
/// `Staked` always carries a non-zero deposit; a settled balance of zero is
/// `NoStake`, so "snapshot present" and "balance > 0" cannot disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stake {
    #[default]
    NoStake,
    Staked { deposited: u64, snapshot: Snapshot },
}

impl Stake {
    /// Deposit recorded at the last settlement (not compounded).
    pub fn deposited(&self) -> u64 {
        match self {
            Stake::NoStake => 0,
            Stake::Staked { deposited, .. } => *deposited,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Stake::NoStake => None,
            Stake::Staked { snapshot, .. } => Some(snapshot),
        }
    }

    pub fn is_staked(&self) -> bool {
        matches!(self, Stake::Staked { .. })
    }
}

/// Per-user state: stake plus the ledger of gains already harvested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depositor {
    pub user: Pubkey,
    /// Registration order number
    pub user_id: u64,
    pub stake: Stake,
    /// Lifetime gains moved out of the vault to this user
    pub cumulative_gains: AssetMap<u64>,
}

impl Depositor {
    pub fn new(user: Pubkey, user_id: u64) -> Self {
        Self {
            user,
            user_id,
            stake: Stake::NoStake,
            cumulative_gains: AssetMap::default(),
        }
    }

    pub fn to_record(&self) -> DepositorRecord {
        let mut record = DepositorRecord::zeroed();
        record.user = self.user.to_bytes();
        record.user_id = self.user_id;
        record.cumulative_gains = self.cumulative_gains.to_array();
        if let Stake::Staked { deposited, snapshot } = &self.stake {
            record.staked = 1;
            record.deposited = *deposited;
            record.snapshot_scale = snapshot.scale;
            record.snapshot_epoch = snapshot.epoch;
            record.snapshot_product = pack_u128(snapshot.product);
            record.snapshot_sums = snapshot.sums.map(|s| s.0).to_array();
        }
        record
    }

    /// Rebuild a depositor from its fixed-layout record.
    ///
    /// Rejects records whose stake flag disagrees with the stored deposit.
    pub fn from_record(record: &DepositorRecord) -> Result<Self, PoolError> {
        let stake = match (record.staked, record.deposited) {
            (0, 0) => Stake::NoStake,
            (1, deposited) if deposited > 0 => {
                let product = unpack_u128(record.snapshot_product);
                if product == 0 {
                    return Err(PoolError::CorruptRecord);
                }
                Stake::Staked {
                    deposited,
                    snapshot: Snapshot {
                        sums: AssetMap::from_array(record.snapshot_sums).map(U256),
                        product,
                        scale: record.snapshot_scale,
                        epoch: record.snapshot_epoch,
                    },
                }
            }
            _ => return Err(PoolError::CorruptRecord),
        };

        Ok(Self {
            user: Pubkey::new_from_array(record.user),
            user_id: record.user_id,
            stake,
            cumulative_gains: AssetMap::from_array(record.cumulative_gains),
        })
    }
}

// 128/256-bit values are stored as little-endian u64 words so every record
// keeps 8-byte alignment regardless of the toolchain's u128 alignment.

pub fn pack_u128(value: u128) -> [u64; 2] {
    [value as u64, (value >> 64) as u64]
}

pub fn unpack_u128(words: [u64; 2]) -> u128 {
    ((words[1] as u128) << 64) | (words[0] as u128)
}

/// Fixed-layout depositor state for hosts that keep one record per user.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DepositorRecord {
    /// Depositor key
    pub user: [u8; 32],

    /// Registration order number
    pub user_id: u64,

    /// Recorded (uncompounded) deposit; 0 iff not staked
    pub deposited: u64,

    pub snapshot_scale: u64,

    pub snapshot_epoch: u64,

    /// Snapshot `P` (u128 as two words)
    pub snapshot_product: [u64; 2],

    /// Snapshot `S` per asset (U256 as four words each)
    pub snapshot_sums: [[u64; 4]; Asset::COUNT],

    /// Harvested gains per asset
    pub cumulative_gains: [u64; Asset::COUNT],

    /// 1 = staked, 0 = no stake
    pub staked: u8,

    /// Padding for alignment
    pub _padding: [u8; 7],

    /// Reserved for future use
    pub _reserved: [u8; 16],
}

pub const DEPOSITOR_RECORD_SIZE: usize = core::mem::size_of::<DepositorRecord>();

/// Fixed-layout global pool scalars. The epoch-scale sum table is kept
/// separately since it grows with every scale and epoch change.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct PoolRecord {
    /// Running product `P` (u128 as two words)
    pub product: [u64; 2],

    pub total_deposits: u64,

    pub current_epoch: u64,

    pub current_scale: u64,

    /// Depositors ever approved
    pub num_users: u64,

    /// Depositors with a non-zero recorded stake
    pub active_depositors: u64,

    /// Unix time HBB issuance counts from
    pub hbb_emissions_start_ts: u64,

    /// Gains held for depositors, per asset
    pub collateral_vault: [u64; Asset::COUNT],

    /// Lifetime gains received (liquidations and HBB issuance), per asset
    pub cumulative_gains_total: [u64; Asset::COUNT],

    /// Reserved for future use
    pub _reserved: [u8; 8],
}

pub const POOL_RECORD_SIZE: usize = core::mem::size_of::<PoolRecord>();
