//! Helper macro for implementing the standard arithmetic traits on single-field newtypes.

/// Implements a binary, in-place or unary operator trait for a tuple struct by delegating to the
/// inner value.
///
/// ```
/// use std::ops::{Add, Neg};
/// use lokapay_common::op;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct Cents(i64);
/// op!(binary Cents, Add, add);
/// op!(unary Cents, Neg, neg);
///
/// assert_eq!(Cents(15) + Cents(27), Cents(42));
/// assert_eq!(-Cents(42), Cents(-42));
/// ```
#[macro_export]
macro_rules! op {
    (binary $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl $impl_trait for $for_struct {
            type Output = Self;
            fn $impl_fn(self, rhs: Self) -> Self::Output {
                Self(self.0.$impl_fn(rhs.0))
            }
        }
    };

    (inplace $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl $impl_trait for $for_struct {
            fn $impl_fn(&mut self, rhs: Self) {
                self.0.$impl_fn(rhs.0)
            }
        }
    };

    (unary $for_struct:ident, $impl_trait:ident, $impl_fn:ident) => {
        impl $impl_trait for $for_struct {
            type Output = Self;
            fn $impl_fn(self) -> Self::Output {
                Self(self.0.$impl_fn())
            }
        }
    };
}
