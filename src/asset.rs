//! Closed set of tokens the pool distributes and a table indexed by it.
//!
//! Every per-asset map in the pool is an `AssetMap`: always fully populated,
//! so there is no "missing key" case anywhere.

use core::ops::{Index, IndexMut};

/// Tokens the pool can distribute: collateral seized by liquidations, plus
/// the HBB reward token issued on a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Asset {
    Sol = 0,
    Eth = 1,
    Btc = 2,
    Srm = 3,
    Ray = 4,
    Ftt = 5,
    Hbb = 6,
}

impl Asset {
    pub const COUNT: usize = 7;

    pub const ALL: [Asset; Asset::COUNT] = [
        Asset::Sol,
        Asset::Eth,
        Asset::Btc,
        Asset::Srm,
        Asset::Ray,
        Asset::Ftt,
        Asset::Hbb,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Asset::Sol => "SOL",
            Asset::Eth => "ETH",
            Asset::Btc => "BTC",
            Asset::Srm => "SRM",
            Asset::Ray => "RAY",
            Asset::Ftt => "FTT",
            Asset::Hbb => "HBB",
        }
    }
}

/// One value per `Asset`, stored in `Asset::ALL` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssetMap<T>([T; Asset::COUNT]);

impl<T: Copy + Default> AssetMap<T> {
    /// Map holding `value` for `asset` and the default everywhere else.
    pub fn of(asset: Asset, value: T) -> Self {
        let mut map = Self::default();
        map[asset] = value;
        map
    }

    /// Later pairs overwrite earlier ones for the same asset.
    pub fn from_pairs(pairs: &[(Asset, T)]) -> Self {
        let mut map = Self::default();
        for &(asset, value) in pairs {
            map[asset] = value;
        }
        map
    }
}

impl<T: Copy> AssetMap<T> {
    pub const fn from_array(values: [T; Asset::COUNT]) -> Self {
        Self(values)
    }

    pub fn to_array(self) -> [T; Asset::COUNT] {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Asset, T)> + '_ {
        Asset::ALL.into_iter().map(move |asset| (asset, self.0[asset.index()]))
    }

    pub fn map<U: Copy>(self, f: impl Fn(T) -> U) -> AssetMap<U> {
        AssetMap(self.0.map(f))
    }

    pub fn try_map<U: Copy + Default>(self, f: impl Fn(T) -> Option<U>) -> Option<AssetMap<U>> {
        let mut out = [U::default(); Asset::COUNT];
        for (slot, value) in out.iter_mut().zip(self.0) {
            *slot = f(value)?;
        }
        Some(AssetMap(out))
    }

    /// Element-wise fallible combination; `None` from any element fails the whole map.
    pub fn try_zip<U: Copy, R: Copy + Default>(
        self,
        other: AssetMap<U>,
        f: impl Fn(T, U) -> Option<R>,
    ) -> Option<AssetMap<R>> {
        let mut out = [R::default(); Asset::COUNT];
        for asset in Asset::ALL {
            let i = asset.index();
            out[i] = f(self.0[i], other.0[i])?;
        }
        Some(AssetMap(out))
    }
}

impl AssetMap<u64> {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.try_zip(other, u64::checked_add)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.try_zip(other, u64::checked_sub)
    }
}

impl<T> Index<Asset> for AssetMap<T> {
    type Output = T;

    fn index(&self, asset: Asset) -> &T {
        &self.0[asset.index()]
    }
}

impl<T> IndexMut<Asset> for AssetMap<T> {
    fn index_mut(&mut self, asset: Asset) -> &mut T {
        &mut self.0[asset.index()]
    }
}
