use crate::error::{DomainError, DomainResult};
use serde::Serialize;

/// Severity of an operator notice. Closed set, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Danger,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Info => "info",
            NoticeKind::Warning => "warning",
            NoticeKind::Danger => "danger",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "success" => Ok(NoticeKind::Success),
            "info" => Ok(NoticeKind::Info),
            "warning" => Ok(NoticeKind::Warning),
            "danger" => Ok(NoticeKind::Danger),
            other => Err(DomainError::UnknownNoticeKind(other.to_string())),
        }
    }
}

/// Operator role a notice channel client declares on handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Reception,
    DeptAdmin,
    SysAdmin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Reception, Role::DeptAdmin, Role::SysAdmin];

    pub fn tag(&self) -> &'static str {
        match self {
            Role::Reception => "reception",
            Role::DeptAdmin => "deptadmin",
            Role::SysAdmin => "sysadmin",
        }
    }

    pub fn from_tag(tag: &str) -> DomainResult<Self> {
        match tag {
            "reception" => Ok(Role::Reception),
            "deptadmin" => Ok(Role::DeptAdmin),
            "sysadmin" => Ok(Role::SysAdmin),
            other => Err(DomainError::UnknownRole(other.to_string())),
        }
    }
}

/// Message pushed to operator clients over the notice channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub head: String,
    pub msg: String,
    pub kind: NoticeKind,
    pub timeout_ms: u64,
}

impl Notice {
    /// `timeout_secs` is the client-side display time.
    pub fn new(
        head: impl Into<String>,
        msg: impl Into<String>,
        kind: NoticeKind,
        timeout_secs: u64,
    ) -> Self {
        Self {
            head: head.into(),
            msg: msg.into(),
            kind,
            timeout_ms: timeout_secs * 1000,
        }
    }
}
