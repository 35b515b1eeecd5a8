// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed integer ids and the allocator which hands them out.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use core::fmt::{Debug, Formatter};
use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

mod alloc;

pub use alloc::*;

#[allow(unused_imports)] // re-export
#[cfg(any(test, feature = "bolero"))]
pub use contract::*;

/// A `U` tagged with the kind of thing it names.
///
/// Sfnums, auxiliary device ids and port indices are all `u32`, and mixing them up is an easy
/// mistake. Tagging each with its own `T` turns that mistake into a type error:
///
/// ```rust,compile_fail
/// # use subfn_id::Id;
/// struct Sfnum;
/// struct AuxId;
/// fn mixup(sfnum: Id<Sfnum>) -> Id<AuxId> {
///     sfnum
/// }
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[repr(transparent)]
pub struct Id<T: ?Sized, U = u32>(U, PhantomData<fn() -> T>);

// Derives would put bounds on `T`, which is only a marker.
impl<T: ?Sized, U: Copy> Copy for Id<T, U> {}

impl<T: ?Sized, U: Clone> Clone for Id<T, U> {
    fn clone(&self) -> Self {
        Self::from_raw(self.0.clone())
    }
}

impl<T: ?Sized, U: Hash> Hash for Id<T, U> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T: ?Sized, U: PartialEq> PartialEq for Id<T, U> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: ?Sized, U: Eq> Eq for Id<T, U> {}

impl<T: ?Sized, U: Ord> PartialOrd for Id<T, U> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized, U: Ord> Ord for Id<T, U> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: ?Sized, U> AsRef<U> for Id<T, U> {
    fn as_ref(&self) -> &U {
        &self.0
    }
}

impl<T: ?Sized, U: Display> Display for Id<T, U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<T: ?Sized, U: Debug> Debug for Id<T, U> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl<T: ?Sized, U> Id<T, U> {
    /// Tag `raw`. Meant for allocators; re-tagging an id of another kind with
    /// `from_raw(other.into_raw())` throws away the check this type exists for.
    #[must_use]
    pub const fn from_raw(raw: U) -> Self {
        Self(raw, PhantomData)
    }

    #[must_use]
    pub fn into_raw(self) -> U {
        self.0
    }

    #[must_use]
    pub const fn as_raw(&self) -> &U {
        &self.0
    }
}

impl<T: ?Sized> Id<T, u32> {
    /// The raw `u32` value of this id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::Id;
    use bolero::{Driver, TypeGenerator};
    use std::marker::PhantomData;

    impl<T: ?Sized + 'static, U> TypeGenerator for Id<T, U>
    where
        U: TypeGenerator,
    {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            Some(Id(driver.produce()?, PhantomData))
        }
    }
}

#[cfg(test)]
mod test {
    use crate::Id;

    struct Marker;

    #[test]
    fn raw_round_trip_keeps_value() {
        bolero::check!().with_type().for_each(|raw: &u32| {
            let id = Id::<Marker>::from_raw(*raw);
            assert_eq!(id.as_u32(), *raw);
            assert_eq!(*id.as_raw(), *raw);
            assert_eq!(id.to_string(), raw.to_string());
        });
    }

    #[test]
    fn ordering_follows_raw_value() {
        bolero::check!()
            .with_type()
            .for_each(|(a, b): &(u32, u32)| {
                let (x, y) = (Id::<Marker>::from_raw(*a), Id::<Marker>::from_raw(*b));
                assert_eq!(x.cmp(&y), a.cmp(b));
                assert_eq!(x == y, a == b);
            });
    }
}
