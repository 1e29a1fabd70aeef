/// A type that can be used as the index of an [`crate::index_vec::IdxVec`] /
/// [`crate::index_slice::IdxSlice`].
///
/// Implementors are almost always small newtype wrappers around `usize`
/// (`BlockId(usize)`, `ValueId(usize)`, ...). Using a dedicated type per
/// arena, rather than a bare `usize`, makes it a compile error to index a
/// `Vec<Function>` with a `BlockId` that was only ever valid within some
/// other function.
pub trait Idx: 'static + Eq + PartialEq + Copy {
    fn new(idx: usize) -> Self;
    fn idx(&self) -> usize;
    fn incr(&mut self);
    fn incr_by(&mut self, by: usize);
}

/// Defines a newtype wrapping `usize` and implements [`Idx`] for it.
///
/// ```ignore
/// define_idx!(pub struct BlockId);
/// ```
#[macro_export]
macro_rules! define_idx {
    ($(#[$meta:meta])* $vis:vis struct $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
        $vis struct $name(pub usize);

        impl $crate::idx::Idx for $name {
            #[inline]
            fn new(idx: usize) -> Self {
                $name(idx)
            }

            #[inline]
            fn idx(&self) -> usize {
                self.0
            }

            #[inline]
            fn incr(&mut self) {
                self.0 += 1;
            }

            #[inline]
            fn incr_by(&mut self, by: usize) {
                self.0 += by;
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", stringify!($name), self.0)
            }
        }
    };
}
