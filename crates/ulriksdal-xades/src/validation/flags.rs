#![forbid(unsafe_code)]

//! Rule selection bitmask.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Set of validation rules, one bit per rule.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidationFlags(pub u32);

impl ValidationFlags {
    pub const NONE: Self = Self(0);
    pub const CHECK_XMLDSIG_SIGNATURE: Self = Self(0x00001);
    pub const VALIDATE_AGAINST_SCHEMA: Self = Self(0x00002);
    pub const CHECK_SAME_CERTIFICATE: Self = Self(0x00004);
    pub const CHECK_ALL_REFERENCES_EXIST_IN_ALL_DATA_OBJECTS_TIME_STAMP: Self = Self(0x00008);
    pub const CHECK_ALL_HASH_DATA_INFOS_IN_INDIVIDUAL_DATA_OBJECTS_TIME_STAMP: Self = Self(0x00010);
    pub const CHECK_COUNTER_SIGNATURES: Self = Self(0x00020);
    pub const CHECK_COUNTER_SIGNATURES_REFERENCE: Self = Self(0x00040);
    pub const CHECK_OBJECT_REFERENCES_IN_COMMITMENT_TYPE_INDICATION: Self = Self(0x00080);
    pub const CHECK_IF_CLAIMED_ROLES_OR_CERTIFIED_ROLES_PRESENT_IN_SIGNER_ROLE: Self = Self(0x00100);
    pub const CHECK_HASH_DATA_INFO_OF_SIGNATURE_TIME_STAMP_POINTS_TO_SIGNATURE_VALUE: Self = Self(0x00200);
    pub const CHECK_QUALIFYING_PROPERTIES_TARGET: Self = Self(0x00400);
    pub const CHECK_QUALIFYING_PROPERTIES: Self = Self(0x00800);
    pub const CHECK_SIG_AND_REFS_TIME_STAMP_HASH_DATA_INFOS: Self = Self(0x01000);
    pub const CHECK_REFS_ONLY_TIME_STAMP_HASH_DATA_INFOS: Self = Self(0x02000);
    pub const CHECK_ARCHIVE_TIME_STAMP_HASH_DATA_INFOS: Self = Self(0x04000);
    pub const CHECK_XADES_C_IS_XADES_T: Self = Self(0x08000);
    pub const CHECK_XADES_XL_IS_XADES_X: Self = Self(0x10000);
    pub const CHECK_CERTIFICATE_VALUES_MATCH_CERTIFICATE_REFS: Self = Self(0x20000);
    pub const CHECK_REVOCATION_VALUES_MATCH_REVOCATION_REFS: Self = Self(0x40000);
    pub const CHECK_TIME_STAMP_MESSAGE_IMPRINTS: Self = Self(0x80000);
    pub const ALL_CHECKS: Self = Self(0xFFFFF);

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Flags from raw bits; bits outside [`ALL_CHECKS`](Self::ALL_CHECKS)
    /// are dropped.
    pub fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_CHECKS.0)
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Individual flags in ascending bit order.
    pub fn iter(&self) -> impl Iterator<Item = Self> + '_ {
        (0..20)
            .map(|shift| Self(1 << shift))
            .filter(move |f| self.contains(*f))
    }
}

impl Default for ValidationFlags {
    fn default() -> Self {
        Self::ALL_CHECKS
    }
}

impl BitOr for ValidationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ValidationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ValidationFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for ValidationFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0 & Self::ALL_CHECKS.0)
    }
}

impl fmt::Debug for ValidationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidationFlags({:#07x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_checks_is_union_of_rules() {
        let mut all = ValidationFlags::NONE;
        for f in ValidationFlags::ALL_CHECKS.iter() {
            all |= f;
        }
        assert_eq!(all, ValidationFlags::ALL_CHECKS);
        assert_eq!(ValidationFlags::ALL_CHECKS.iter().count(), 20);
        assert_eq!(ValidationFlags::default(), ValidationFlags::ALL_CHECKS);
    }

    #[test]
    fn test_set_operations() {
        let f = ValidationFlags::CHECK_XMLDSIG_SIGNATURE | ValidationFlags::CHECK_SAME_CERTIFICATE;
        assert_eq!(f.bits(), 0x5);
        assert!(f.contains(ValidationFlags::CHECK_SAME_CERTIFICATE));
        assert!(!f.contains(ValidationFlags::VALIDATE_AGAINST_SCHEMA));
        assert_eq!((!f).bits(), 0xFFFFA);
        assert_eq!(ValidationFlags::from_bits_truncate(0xFFF_FFFF), ValidationFlags::ALL_CHECKS);
        assert!((f & ValidationFlags::VALIDATE_AGAINST_SCHEMA).is_empty());
    }
}
