use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

/// What a principal is allowed to do. Higher rights include all lower ones.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize_repr, Deserialize_repr,
)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl Rights {
    /// Do these rights cover `required`?
    pub fn permits(self, required: Rights) -> bool {
        self >= required
    }
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// A kind of principal, identified by the rights it needs.
pub trait User {
    const RIGHTS: Rights;
}

/// Any authenticated principal. Admins count as voters too.
pub enum Voter {}

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

/// A principal allowed to manage elections and candidates.
pub enum Admin {}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;
}
