//! Access tokens and instruction permissions

use std::fmt::Display;

use crate::ql::executor::Instruction;

/// Grants every permission
pub const ALL_PERMISSIONS: &str = "*";
const WILDCARD_SUFFIX: &str = ".*";

/// The permission an instruction requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPermission {
    AllowedForAll,
    Required(&'static str),
}

impl Display for TokenPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenPermission::AllowedForAll => write!(f, "allowed for all"),
            TokenPermission::Required(name) => write!(f, "{}", name),
        }
    }
}

/// A client's token and the permissions it was issued with
///
/// Permissions are dotted names (`table.read`). A granted `table.*` covers every
/// permission under `table.`, a granted `*` covers everything.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    token: String,
    permissions: Vec<String>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, permissions: Vec<String>) -> Self {
        Self {
            token: token.into(),
            permissions,
        }
    }

    /// Token allowed to run every instruction
    pub fn superuser(token: impl Into<String>) -> Self {
        Self::new(token, vec![ALL_PERMISSIONS.to_string()])
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn has(&self, permission: &str) -> bool {
        self.permissions.iter().any(|granted| {
            granted == ALL_PERMISSIONS
                || granted == permission
                || granted
                    .strip_suffix(WILDCARD_SUFFIX)
                    .is_some_and(|prefix| {
                        permission
                            .strip_prefix(prefix)
                            .is_some_and(|rest| rest.starts_with('.'))
                    })
        })
    }

    /// Whether the token satisfies an instruction's requirement
    pub fn allows(&self, permission: TokenPermission) -> bool {
        match permission {
            TokenPermission::AllowedForAll => true,
            TokenPermission::Required(name) => self.has(name),
        }
    }
}

/// Decides whether a token may run an instruction
pub trait PermissionCheck: Send + Sync {
    fn has_permission(&self, token: &AccessToken, instruction: &dyn Instruction) -> bool;
}

/// Checks the instruction's declared permission against the token's grants
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPermissionCheck;

impl PermissionCheck for TokenPermissionCheck {
    fn has_permission(&self, token: &AccessToken, instruction: &dyn Instruction) -> bool {
        token.allows(instruction.permission())
    }
}
