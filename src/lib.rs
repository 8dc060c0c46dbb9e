//! Stability Pool Accounting Engine
//!
//! Distributes liquidation losses (debt write-offs) and gains (seized
//! collateral) across pooled depositors in proportion to their live stake.
//! Liquidations and per-depositor queries are both O(1) in the number of
//! depositors and past liquidations.
//!
//! Bookkeeping:
//! - `P`: running product, the surviving fraction of a unit stake
//! - `S[epoch][scale][asset]`: running sum of gain per unit staked, times `P`
//! - Each depositor keeps a snapshot of `(S, P, scale, epoch)` from its last
//!   settlement; compounded balance and pending gains are derived from it
//! - `scale` increments when `P` would lose precision (P rescaled by 1e9)
//! - `epoch` increments on full depletion and wipes every older stake
//!
//! HBB rewards follow a halving-per-year emission curve. Whatever the curve
//! owes is issued at the start of each deposit, withdraw, harvest and
//! liquidation, as a loss-free distribution into `S`.
//!
//! The engine only keeps accounting. Every state-changing operation returns
//! an effects value listing the transfers the host must carry out.
//!
//! Modules:
//!   math      - Fixed-point constants, per-unit / compounding math, HBB curve
//!   asset     - Distributable tokens and the per-asset table
//!   sum_table - Epoch → scale → `S` table
//!   state     - Depositor snapshot/stake and fixed-layout records
//!   pool      - Global state, liquidation and depositor operations
//!   ledger    - User-keyed registry and query surface

pub mod asset;
pub mod error;
pub mod ledger;
pub mod math;
pub mod pool;
pub mod state;
pub mod sum_table;
