use std::fmt;

use num_traits::{Num, NumAssign, NumCast};

/// Runtime tag identifying an element type.
///
/// The numeric values match the persisted type-tag convention of
/// collaborating tools; `Void` marks an unknown type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeTag {
    Byte = 0,
    Short = 1,
    Int = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Void = -1,
}

impl TypeTag {
    /// Size of one element in bytes (0 for `Void`).
    pub fn size(self) -> usize {
        match self {
            TypeTag::Byte => 1,
            TypeTag::Short => 2,
            TypeTag::Int => 4,
            TypeTag::Long => 8,
            TypeTag::Float => 4,
            TypeTag::Double => 8,
            TypeTag::Void => 0,
        }
    }

    pub fn is_numeric(self) -> bool {
        self != TypeTag::Void
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, TypeTag::Float | TypeTag::Double)
    }
}

/// Element types storable in arrays: i8, i16, i32, i64, f32, f64.
///
/// `Acc` is the widened accumulator used by `sum` and `dot` (i64 for
/// the integer types, f64 for the floating-point types). Cross-type
/// conversion routes through f64 with `as`-cast semantics.
pub trait Element:
    Copy
    + PartialOrd
    + PartialEq
    + fmt::Debug
    + Send
    + Sync
    + 'static
    + Num
    + NumAssign
    + NumCast
{
    const TAG: TypeTag;

    type Acc: Element;

    fn to_f64_lossy(self) -> f64;
    fn from_f64_lossy(v: f64) -> Self;
    fn to_acc(self) -> Self::Acc;

    /// Convert from another element type (C-style cast semantics).
    fn from_elem<U: Element>(value: U) -> Self {
        Self::from_f64_lossy(value.to_f64_lossy())
    }
}

macro_rules! impl_element {
    ($t:ty, $tag:expr, $acc:ty) => {
        impl Element for $t {
            const TAG: TypeTag = $tag;

            type Acc = $acc;

            fn to_f64_lossy(self) -> f64 {
                self as f64
            }

            fn from_f64_lossy(v: f64) -> Self {
                v as $t
            }

            fn to_acc(self) -> $acc {
                self as $acc
            }
        }
    };
}

impl_element!(i8, TypeTag::Byte, i64);
impl_element!(i16, TypeTag::Short, i64);
impl_element!(i32, TypeTag::Int, i64);
impl_element!(i64, TypeTag::Long, i64);
impl_element!(f32, TypeTag::Float, f64);
impl_element!(f64, TypeTag::Double, f64);
