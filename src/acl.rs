//! Access control: principals, stream ACLs and the checker consulted per event.

use crate::streams;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Role that every principal holds.
pub const ALL_ROLE: &str = "$all";

/// Role of administrators.
pub const ADMINS_ROLE: &str = "$admins";

/// The caller on whose behalf a read runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            name: "$anonymous".into(),
            roles: Vec::new(),
        }
    }

    pub fn admin() -> Self {
        Self {
            name: "admin".into(),
            roles: vec![ADMINS_ROLE.into()],
        }
    }

    pub fn user(name: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            name: name.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// True if any entry of `allowed` names this principal or one of its roles.
    ///
    /// `$all` matches everyone.
    pub fn is_in(&self, allowed: &[String]) -> bool {
        allowed.iter().any(|entry| {
            entry == ALL_ROLE || *entry == self.name || self.roles.iter().any(|r| r == entry)
        })
    }
}

impl Default for Principal {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Per-permission role lists. `None` falls back to the default ACL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAcl {
    #[serde(rename = "$r", default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub read: Option<Vec<String>>,
    #[serde(rename = "$w", default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub write: Option<Vec<String>>,
    #[serde(rename = "$d", default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<String>>,
    #[serde(rename = "$mr", default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub metadata_read: Option<Vec<String>>,
    #[serde(rename = "$mw", default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub metadata_write: Option<Vec<String>>,
}

impl StreamAcl {
    /// ACL granting every permission to `roles`.
    pub fn uniform(roles: &[&str]) -> Self {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        Self {
            read: Some(roles.clone()),
            write: Some(roles.clone()),
            delete: Some(roles.clone()),
            metadata_read: Some(roles.clone()),
            metadata_write: Some(roles),
        }
    }

    /// ACL that only sets readers.
    pub fn readers(roles: &[&str]) -> Self {
        Self {
            read: Some(roles.iter().map(|r| r.to_string()).collect()),
            ..Default::default()
        }
    }

    fn roles_for(&self, kind: AccessKind) -> Option<&[String]> {
        match kind {
            AccessKind::Read => self.read.as_deref(),
            AccessKind::Write => self.write.as_deref(),
            AccessKind::Delete => self.delete.as_deref(),
            AccessKind::MetadataRead => self.metadata_read.as_deref(),
            AccessKind::MetadataWrite => self.metadata_write.as_deref(),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(role)) => Some(vec![role]),
        Some(OneOrMany::Many(roles)) => Some(roles),
    })
}

/// Default ACLs from `$settings`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSettings {
    #[serde(rename = "$userStreamAcl", default, skip_serializing_if = "Option::is_none")]
    pub user_stream_acl: Option<StreamAcl>,
    #[serde(rename = "$systemStreamAcl", default, skip_serializing_if = "Option::is_none")]
    pub system_stream_acl: Option<StreamAcl>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
    Delete,
    MetadataRead,
    MetadataWrite,
}

/// An access request against one stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub kind: AccessKind,
    pub stream: String,
}

impl Operation {
    pub fn read(stream: impl Into<String>) -> Self {
        Self {
            kind: AccessKind::Read,
            stream: stream.into(),
        }
    }

    pub fn write(stream: impl Into<String>) -> Self {
        Self {
            kind: AccessKind::Write,
            stream: stream.into(),
        }
    }

    pub fn delete(stream: impl Into<String>) -> Self {
        Self {
            kind: AccessKind::Delete,
            stream: stream.into(),
        }
    }
}

/// Decides whether a principal may perform an operation.
///
/// Called per candidate event, so implementations must reflect ACL writes
/// as soon as they are committed.
pub trait AccessChecker: Send + Sync {
    fn check(&self, principal: &Principal, operation: &Operation) -> bool;
}

#[derive(Debug, Default)]
struct AclState {
    stream_acls: HashMap<String, StreamAcl>,
    settings: SystemSettings,
}

/// ACL-backed checker. Clones share state.
///
/// Lookup order per permission: the stream's own ACL, then the default from
/// `$settings` (system or user, by stream name), then the built-in default
/// (everyone for user streams, `$admins` for system streams).
#[derive(Clone, Debug, Default)]
pub struct AclAccessChecker {
    state: Arc<RwLock<AclState>>,
}

impl AclAccessChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ACL of `stream`; `None` clears it.
    pub fn set_stream_acl(&self, stream: &str, acl: Option<StreamAcl>) {
        let mut state = self.state.write();
        match acl {
            Some(acl) => {
                state.stream_acls.insert(stream.to_string(), acl);
            }
            None => {
                state.stream_acls.remove(stream);
            }
        }
    }

    pub fn set_settings(&self, settings: SystemSettings) {
        self.state.write().settings = settings;
    }

    pub fn settings(&self) -> SystemSettings {
        self.state.read().settings.clone()
    }

    fn allowed_roles(&self, kind: AccessKind, stream: &str) -> Vec<String> {
        let state = self.state.read();

        if let Some(roles) = state.stream_acls.get(stream).and_then(|acl| acl.roles_for(kind)) {
            return roles.to_vec();
        }

        let system = uses_system_defaults(stream);
        let default_acl = if system {
            state.settings.system_stream_acl.as_ref()
        } else {
            state.settings.user_stream_acl.as_ref()
        };
        if let Some(roles) = default_acl.and_then(|acl| acl.roles_for(kind)) {
            return roles.to_vec();
        }

        if system {
            vec![ADMINS_ROLE.to_string()]
        } else {
            vec![ALL_ROLE.to_string()]
        }
    }
}

fn uses_system_defaults(stream: &str) -> bool {
    streams::is_system_stream(stream) && !streams::is_ephemeral(stream)
}

impl AccessChecker for AclAccessChecker {
    fn check(&self, principal: &Principal, operation: &Operation) -> bool {
        // Metastream access is governed by the metadata permissions of the
        // stream it describes.
        let (kind, stream) = match streams::original_stream_of(&operation.stream) {
            Some(original) => match operation.kind {
                AccessKind::Read | AccessKind::MetadataRead => (AccessKind::MetadataRead, original),
                AccessKind::Write | AccessKind::MetadataWrite | AccessKind::Delete => {
                    (AccessKind::MetadataWrite, original)
                }
            },
            None => (operation.kind, operation.stream.as_str()),
        };

        let allowed = self.allowed_roles(kind, stream);
        principal.is_in(&allowed)
    }
}
