//! Field-level byte-order correction.
//!
//! Each supported scalar width swaps independently through [`SwapBytes`].
//! Structured payloads are only corrected field by field, by code that knows
//! their layout; there is no whole-buffer reversal.

use serde::{Deserialize, Serialize};

/// Byte order declared by a container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    #[cfg(target_endian = "big")]
    pub const HOST: Endianness = Endianness::Big;
    #[cfg(target_endian = "little")]
    pub const HOST: Endianness = Endianness::Little;

    pub fn name(self) -> &'static str {
        match self {
            Endianness::Big    => "big",
            Endianness::Little => "little",
        }
    }
}

/// A scalar whose byte order can be reversed in place.
pub trait SwapBytes {
    fn swap_in_place(&mut self);
}

macro_rules! impl_swap_int {
    ($($t:ty),*) => {
        $(impl SwapBytes for $t {
            #[inline]
            fn swap_in_place(&mut self) { *self = self.swap_bytes(); }
        })*
    };
}

impl_swap_int!(i16, u16, i32, u32, i64, u64);

impl SwapBytes for f32 {
    #[inline]
    fn swap_in_place(&mut self) { *self = f32::from_bits(self.to_bits().swap_bytes()); }
}

impl SwapBytes for f64 {
    #[inline]
    fn swap_in_place(&mut self) { *self = f64::from_bits(self.to_bits().swap_bytes()); }
}

/// Applies [`SwapBytes`] only when the source byte order differs from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndianSwitch {
    active: bool,
}

impl EndianSwitch {
    pub fn new(source: Endianness) -> Self {
        Self::between(source, Endianness::HOST)
    }

    pub fn between(source: Endianness, target: Endianness) -> Self {
        Self { active: source != target }
    }

    pub fn identity() -> Self {
        Self { active: false }
    }

    pub fn is_active(self) -> bool {
        self.active
    }

    #[inline]
    pub fn apply<T: SwapBytes>(self, value: &mut T) {
        if self.active {
            value.swap_in_place();
        }
    }

    /// By-value form of [`apply`](Self::apply).
    #[inline]
    pub fn fix<T: SwapBytes>(self, mut value: T) -> T {
        self.apply(&mut value);
        value
    }
}
