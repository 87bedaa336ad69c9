//! Key capability flags.

use serde::{Deserialize, Serialize};

/// Bit set describing what a key may still be used for.
///
/// The wire encoding matches the server's integer flags: bit 0 set means the
/// key is not obsolete (may verify), bit 1 set means it is not compromised
/// (may encrypt). A freshly generated key carries both bits; policy for
/// special address types (external, E2EE-disabled) is applied by the caller
/// before reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyFlags(u8);

impl KeyFlags {
    /// Key is not obsolete: signatures made by it still verify.
    pub const NOT_OBSOLETE: Self = Self(0b01);

    /// Key is not compromised: new data may be encrypted to it.
    pub const NOT_COMPROMISED: Self = Self(0b10);

    /// No capabilities.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Default flags for a healthy key: not obsolete and not compromised.
    pub const fn baseline() -> Self {
        Self(0b11)
    }

    /// Reconstruct from the wire integer. Unknown bits are preserved.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Wire integer encoding.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit in `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `self` with every bit of `other` cleared.
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether new material may be encrypted to this key.
    pub const fn can_encrypt(self) -> bool {
        self.contains(Self::NOT_COMPROMISED)
    }

    /// Whether signatures from this key are still trusted.
    pub const fn can_verify(self) -> bool {
        self.contains(Self::NOT_OBSOLETE)
    }
}

impl Default for KeyFlags {
    fn default() -> Self {
        Self::baseline()
    }
}
