//! Scalar element types that may live in a segment.

use std::fmt;
use std::mem::{align_of, size_of};

/// Runtime tag for the scalar type of a field.
///
/// The names match the type strings of the layout schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl ScalarType {
    pub const ALL: [ScalarType; 10] = [
        ScalarType::Int8,
        ScalarType::UInt8,
        ScalarType::Int16,
        ScalarType::UInt16,
        ScalarType::Int32,
        ScalarType::UInt32,
        ScalarType::Int64,
        ScalarType::UInt64,
        ScalarType::Float32,
        ScalarType::Float64,
    ];

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Int8 => size_of::<i8>(),
            Self::UInt8 => size_of::<u8>(),
            Self::Int16 => size_of::<i16>(),
            Self::UInt16 => size_of::<u16>(),
            Self::Int32 => size_of::<i32>(),
            Self::UInt32 => size_of::<u32>(),
            Self::Int64 => size_of::<i64>(),
            Self::UInt64 => size_of::<u64>(),
            Self::Float32 => size_of::<f32>(),
            Self::Float64 => size_of::<f64>(),
        }
    }

    /// Natural alignment of one element on this target.
    pub const fn align(self) -> usize {
        match self {
            Self::Int8 => align_of::<i8>(),
            Self::UInt8 => align_of::<u8>(),
            Self::Int16 => align_of::<i16>(),
            Self::UInt16 => align_of::<u16>(),
            Self::Int32 => align_of::<i32>(),
            Self::UInt32 => align_of::<u32>(),
            Self::Int64 => align_of::<i64>(),
            Self::UInt64 => align_of::<u64>(),
            Self::Float32 => align_of::<f32>(),
            Self::Float64 => align_of::<f64>(),
        }
    }

    /// Schema name, e.g. `"float32"`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Parse a schema type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust type that can be viewed directly in segment bytes.
///
/// Sealed: every implementor is a plain numeric type for which any bit
/// pattern is a valid value, so reading foreign bytes is always defined.
pub trait Scalar: sealed::Sealed + Copy + Default + PartialEq + fmt::Debug + 'static {
    const TYPE: ScalarType;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Scalar for $ty {
                const TYPE: ScalarType = ScalarType::$variant;
            }
        )*
    };
}

impl_scalar! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}
