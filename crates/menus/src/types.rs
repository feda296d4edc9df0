//! Menu data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque server-side identifier.
///
/// The CMS returns numeric ids, but nothing here relies on that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct MenuId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for MenuId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        }
    }
}

impl From<MenuId> for String {
    fn from(id: MenuId) -> Self {
        id.0
    }
}

impl MenuId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MenuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Menu entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuKind {
    /// Container for other entries.
    Group,
    /// Navigates to a path.
    Link,
}

impl MenuKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Link => "link",
        }
    }
}

/// Declared parent group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuGroup {
    pub title: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort: Option<i64>,
}

/// Declared child link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuLink {
    pub title: String,
    pub path: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// The declared menu: one group and its links, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuTree {
    pub parent: MenuGroup,
    #[serde(default)]
    pub links: Vec<MenuLink>,
}

impl MenuTree {
    pub fn new(parent: impl Into<String>) -> Self {
        Self {
            parent: MenuGroup {
                title: parent.into(),
                icon: None,
                sort: None,
            },
            links: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_link(mut self, title: impl Into<String>, path: impl Into<String>) -> Self {
        self.links.push(MenuLink {
            title: title.into(),
            path: path.into(),
            icon: None,
        });
        self
    }

    /// Every title this tree owns, parent first.
    pub fn titles(&self) -> Vec<&str> {
        std::iter::once(self.parent.title.as_str())
            .chain(self.links.iter().map(|l| l.title.as_str()))
            .collect()
    }

    /// Sort value for the link at `index`.
    pub fn link_sort(index: usize) -> i64 {
        i64::try_from(index).map_or(i64::MAX, |i| i.saturating_add(1))
    }

    /// Check the tree is well formed.
    pub fn validate(&self) -> Result<(), String> {
        if self.parent.title.trim().is_empty() {
            return Err("menu parent title is empty".to_string());
        }
        let mut seen = std::collections::BTreeSet::new();
        for link in &self.links {
            if link.title.trim().is_empty() {
                return Err("menu link with empty title".to_string());
            }
            if link.path.trim().is_empty() {
                return Err(format!("menu link '{}' has no path", link.title));
            }
            if !seen.insert((link.title.as_str(), link.path.as_str())) {
                return Err(format!(
                    "menu link '{}' -> {} declared twice",
                    link.title, link.path
                ));
            }
        }
        Ok(())
    }
}

/// An entry as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMenu {
    pub id: MenuId,
    pub title: String,
    pub kind: MenuKind,
    pub parent_id: Option<MenuId>,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub sort: Option<i64>,
}

impl RemoteMenu {
    /// Natural key used to match entries across runs.
    pub fn key(&self) -> (&str, Option<&str>) {
        (self.title.as_str(), self.path.as_deref())
    }
}

/// Entry to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMenu {
    pub title: String,
    pub kind: MenuKind,
    pub parent_id: Option<MenuId>,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub sort: Option<i64>,
}

impl NewMenu {
    pub fn group(group: &MenuGroup) -> Self {
        Self {
            title: group.title.clone(),
            kind: MenuKind::Group,
            parent_id: None,
            path: None,
            icon: group.icon.clone(),
            sort: group.sort,
        }
    }

    pub fn link(link: &MenuLink, parent_id: MenuId, sort: i64) -> Self {
        Self {
            title: link.title.clone(),
            kind: MenuKind::Link,
            parent_id: Some(parent_id),
            path: Some(link.path.clone()),
            icon: link.icon.clone(),
            sort: Some(sort),
        }
    }
}

/// In-place change to an existing entry. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MenuPatch {
    pub icon: Option<String>,
    pub sort: Option<i64>,
}

impl MenuPatch {
    pub fn is_empty(&self) -> bool {
        self.icon.is_none() && self.sort.is_none()
    }
}

/// One page of entries plus the server's total, if reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<RemoteMenu>,
    pub total: Option<usize>,
}

/// Account credentials for sign-in.
#[derive(Clone)]
pub struct ApiCredentials {
    pub account: String,
    pub password: String,
}

impl ApiCredentials {
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token returned by sign-in.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Reconciliation phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Authenticated,
    Listed,
    Purged,
    Created,
    Verified,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authenticated => "authenticated",
            Self::Listed => "listed",
            Self::Purged => "purged",
            Self::Created => "created",
            Self::Verified => "verified",
        };
        f.write_str(name)
    }
}
