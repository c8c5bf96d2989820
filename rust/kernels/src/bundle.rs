//! Named groups of tensors passed across the kernel boundary.
//!
//! A kernel takes several tensors in and hands several back. Keeping them as
//! bare tuples makes call sites unreadable, so each group is a small struct
//! generic over the tensor type. The same struct is used with `CubeTensor<R>`
//! when launching `cubecl` kernels and with `FloatTensor<B>` on the backend
//! boundary; [`TensorBundle::map`] converts between them.
//!
//! ```ignore
//! tensor_bundle! {
//!     pub struct CellInputs { wx_norm, rh_norm, bias }
//! }
//!
//! let contiguous = inputs.map(into_contiguous);
//! ```

use std::fmt::Debug;

/// A struct of same-typed tensors that can be mapped field by field.
pub trait TensorBundle<T: Debug + Clone + Send>: Sized + Clone + Send + Debug {
    /// The bundle type with a different element type.
    type Mapped<U: Debug + Clone + Send>: TensorBundle<U>;

    fn map<U: Debug + Clone + Send>(self, f: impl FnMut(T) -> U) -> Self::Mapped<U>;
}

/// Declares a tensor bundle struct with a `TensorBundle` implementation.
///
/// All fields are public and share the generic tensor type `T`.
#[macro_export]
macro_rules! tensor_bundle {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident { $first_field:ident $(, $field:ident)* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name<T> {
            pub $first_field: T,
            $(pub $field: T,)*
        }

        impl<T: std::fmt::Debug + Clone + Send> $crate::TensorBundle<T> for $name<T> {
            type Mapped<U: std::fmt::Debug + Clone + Send> = $name<U>;

            fn map<U: std::fmt::Debug + Clone + Send>(self, mut f: impl FnMut(T) -> U) -> $name<U> {
                $name {
                    $first_field: f(self.$first_field),
                    $($field: f(self.$field),)*
                }
            }
        }
    };
}

pub use crate::tensor_bundle;
