//! Identity of the principal that created an entry.

use serde::{Deserialize, Serialize};

/// Owner user/group ids and display names. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub uid: i64,
    pub gid: i64,
    pub uname: String,
    pub gname: String,
}

impl Owner {
    pub fn new(uid: i64, gid: i64, uname: impl Into<String>, gname: impl Into<String>) -> Self {
        Self {
            uid,
            gid,
            uname: uname.into(),
            gname: gname.into(),
        }
    }
}
