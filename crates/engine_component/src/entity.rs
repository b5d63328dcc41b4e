//! Entity identifiers.
//!
//! An entity is a plain unsigned integer with no data of its own. Three
//! widths are supported through the [`EntityId`] trait: [`ShortEntity`]
//! (`u16`), [`Entity`] (`u32`) and [`LongEntity`] (`u64`). The maximum value
//! of each width is reserved as [`EntityId::NULL`] and is never a live id.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// 16-bit entity identifier.
pub type ShortEntity = u16;

/// 32-bit entity identifier, the default width.
pub type Entity = u32;

/// 64-bit entity identifier.
pub type LongEntity = u64;

/// An unsigned integer usable as an entity identifier.
///
/// Implemented for `u16`, `u32` and `u64`.
pub trait EntityId:
    Copy + Eq + Ord + Hash + Debug + Display + Default + Send + Sync + 'static
{
    /// The reserved sentinel. Never a valid, live identifier.
    const NULL: Self;

    /// Widens the identifier to a `usize` index.
    fn to_index(self) -> usize;

    /// Narrows an index back into an identifier.
    ///
    /// Values that do not fit the width saturate to [`EntityId::NULL`].
    fn from_index(index: usize) -> Self;

    /// Returns the identifier as a `u64`, used for error reporting and logs.
    fn to_u64(self) -> u64;

    /// Returns `true` if this is the [`EntityId::NULL`] sentinel.
    #[inline]
    fn is_null(self) -> bool {
        self == Self::NULL
    }
}

macro_rules! impl_entity_id {
    ($($ty:ty),+) => {
        $(
            impl EntityId for $ty {
                const NULL: Self = <$ty>::MAX;

                #[inline]
                fn to_index(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_index(index: usize) -> Self {
                    <$ty>::try_from(index).unwrap_or(Self::NULL)
                }

                #[inline]
                fn to_u64(self) -> u64 {
                    self as u64
                }
            }
        )+
    };
}

impl_entity_id!(u16, u32, u64);
