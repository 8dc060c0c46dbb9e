use solana_program::program_error::ProgramError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PoolError {
    /// Per-user operation on a user that was never approved
    UserNotRegistered = 0,
    /// approve_depositing called twice for the same user
    UserAlreadyRegistered = 1,
    /// Zero deposit or withdraw amount
    InvalidAmount = 2,
    /// Loss offered to a pool with no stake to absorb it
    DistributionWithZeroStake = 3,
    /// Loss larger than the total deposits
    LossExceedsDeposits = 4,
    /// Checked fixed-point arithmetic overflowed or underflowed
    ArithmeticOverflow = 5,
    /// Epoch-scale sum entry opened out of order
    InvalidSumTableKey = 6,
    /// Fixed-layout record with inconsistent contents
    CorruptRecord = 7,
}

impl From<PoolError> for ProgramError {
    fn from(e: PoolError) -> Self {
        ProgramError::Custom(e as u32)
    }
}
