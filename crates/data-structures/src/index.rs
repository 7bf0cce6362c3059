//! Index types.
//!
//! Every arena in the IR (blocks, functions) is addressed by a dedicated newtype created with
//! [`newtype_index!`](crate::newtype_index), so that a block index can never be used to look up
//! a function and vice versa.

use std::fmt;

pub use index_vec::*;

/// A compact 32-bit index with a niche, so that `Option<Index>` is the same size as `Index`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "nightly", rustc_layout_scalar_valid_range_end(0xFFFF_FF00))]
#[cfg_attr(feature = "nightly", rustc_nonnull_optimization_guaranteed)]
#[cfg_attr(feature = "nightly", rustc_pass_by_value)]
#[repr(transparent)]
pub struct BaseIndex32 {
    #[cfg(feature = "nightly")]
    value: u32,
    #[cfg(not(feature = "nightly"))]
    value: std::num::NonZeroU32,
}

impl fmt::Display for BaseIndex32 {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}

impl fmt::Debug for BaseIndex32 {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}

impl Idx for BaseIndex32 {
    #[inline]
    fn from_usize(value: usize) -> Self {
        assert!(value <= Self::MAX_AS as usize);
        Self::new(value as u32)
    }

    #[inline]
    fn index(self) -> usize {
        self.get() as usize
    }
}

impl BaseIndex32 {
    /// The maximum raw index value.
    pub const MAX_AS: u32 = 0xFFFF_FF00;

    /// The maximum index value.
    pub const MAX: Self = Self::new(Self::MAX_AS);

    /// Creates a new index from the given `value`.
    ///
    /// # Panics
    ///
    /// Panics if `value` exceeds `MAX`.
    #[inline]
    pub const fn new(value: u32) -> Self {
        assert!(value <= Self::MAX_AS);
        #[cfg(feature = "nightly")]
        // SAFETY: checked against `MAX_AS` above.
        return unsafe { Self { value } };

        #[cfg(not(feature = "nightly"))]
        match std::num::NonZeroU32::new(value + 1) {
            Some(value) => Self { value },
            None => panic!("index overflowed"),
        }
    }

    /// Gets the underlying index value.
    #[inline]
    pub const fn get(self) -> u32 {
        #[cfg(feature = "nightly")]
        return self.value;

        #[cfg(not(feature = "nightly"))]
        return self.value.get() - 1;
    }
}

/// Creates one or more index newtypes backed by [`BaseIndex32`].
///
/// The generated types implement [`Idx`], so they can key an [`IndexVec`].
///
/// # Examples
///
/// ```
/// gpusched_data_structures::newtype_index! {
///     /// An example index.
///     pub struct ExampleId;
/// }
///
/// let id = ExampleId::from_usize(3);
/// assert_eq!(id.index(), 3);
/// assert_eq!(format!("{id:?}"), "ExampleId(3)");
/// ```
#[macro_export]
macro_rules! newtype_index {
    () => {};
    ($(#[$attr:meta])* $vis:vis struct $name:ident; $($rest:tt)*) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $vis struct $name($crate::index::BaseIndex32);

        impl $name {
            /// The maximum index value.
            pub const MAX: Self = Self($crate::index::BaseIndex32::MAX);

            /// Creates a new index from the given `value`.
            #[inline]
            #[must_use]
            pub const fn new(value: u32) -> Self {
                Self($crate::index::BaseIndex32::new(value))
            }

            /// Creates a new index from the given `usize`.
            ///
            /// # Panics
            ///
            /// Panics if `value` exceeds `MAX`.
            #[inline]
            #[must_use]
            pub const fn from_usize(value: usize) -> Self {
                assert!(value <= $crate::index::BaseIndex32::MAX_AS as usize);
                Self::new(value as u32)
            }

            /// Gets the underlying index value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0.get()
            }

            /// Gets the underlying index value as a `usize`.
            #[inline]
            #[must_use]
            pub const fn index(self) -> usize {
                self.0.get() as usize
            }
        }

        impl $crate::index::Idx for $name {
            #[inline]
            fn from_usize(value: usize) -> Self {
                Self::from_usize(value)
            }

            #[inline]
            fn index(self) -> usize {
                Self::index(self)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.get())
            }
        }

        $crate::newtype_index!($($rest)*);
    };
}
