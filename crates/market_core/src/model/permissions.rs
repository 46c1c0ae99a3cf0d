//! Owner/group/other permission bits carried by every catalog entry.
//!
//! # Invariants
//! - Each bit is stored as `0` or `1`; the pool rows mirror the three
//!   `*_u` bits for indexing.

use serde::{Deserialize, Serialize};

/// Umask applied when the caller does not provide one.
pub const DEFAULT_UMASK: u32 = 0o177;

/// Use/manage/admin bits for the three permission scopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub owner_u: bool,
    pub owner_m: bool,
    pub owner_a: bool,
    pub group_u: bool,
    pub group_m: bool,
    pub group_a: bool,
    pub other_u: bool,
    pub other_m: bool,
    pub other_a: bool,
}

impl Permissions {
    /// Builds the permission set left after masking `0o777` with `umask`.
    pub fn from_umask(umask: u32) -> Self {
        Self::from_mode(0o777 & !umask)
    }

    /// Builds the permission set from an octal mode such as `0o640`.
    pub fn from_mode(mode: u32) -> Self {
        let bit = |mask: u32| mode & mask != 0;
        Self {
            owner_u: bit(0o400),
            owner_m: bit(0o200),
            owner_a: bit(0o100),
            group_u: bit(0o040),
            group_m: bit(0o020),
            group_a: bit(0o010),
            other_u: bit(0o004),
            other_m: bit(0o002),
            other_a: bit(0o001),
        }
    }

    /// Returns the octal mode equivalent of these bits.
    pub fn mode(&self) -> u32 {
        self.named_bits()
            .into_iter()
            .zip([0o400, 0o200, 0o100, 0o040, 0o020, 0o010, 0o004, 0o002, 0o001])
            .filter(|((_, set), _)| *set)
            .fold(0, |mode, (_, mask)| mode | mask)
    }

    /// Bits paired with the tag names used in the canonical record.
    pub fn named_bits(&self) -> [(&'static str, bool); 9] {
        [
            ("OWNER_U", self.owner_u),
            ("OWNER_M", self.owner_m),
            ("OWNER_A", self.owner_a),
            ("GROUP_U", self.group_u),
            ("GROUP_M", self.group_m),
            ("GROUP_A", self.group_a),
            ("OTHER_U", self.other_u),
            ("OTHER_M", self.other_m),
            ("OTHER_A", self.other_a),
        ]
    }

    /// Sets one bit by tag name. Returns `false` for an unknown name.
    pub fn set_named(&mut self, name: &str, value: bool) -> bool {
        let slot = match name {
            "OWNER_U" => &mut self.owner_u,
            "OWNER_M" => &mut self.owner_m,
            "OWNER_A" => &mut self.owner_a,
            "GROUP_U" => &mut self.group_u,
            "GROUP_M" => &mut self.group_m,
            "GROUP_A" => &mut self.group_a,
            "OTHER_U" => &mut self.other_u,
            "OTHER_M" => &mut self.other_m,
            "OTHER_A" => &mut self.other_a,
            _ => return false,
        };
        *slot = value;
        true
    }
}
