//! In-memory menu store.
//!
//! Behaves like the CMS route resource closely enough to exercise the
//! reconciler end to end: ids are assigned on create, deleting a group
//! leaves its children orphaned (the reconciler must remove them itself),
//! and listings honour the requested page size.

use crate::api::MenuApi;
use crate::error::{Error, Result};
use crate::types::{ApiCredentials, AuthToken, Listing, MenuId, MenuPatch, NewMenu, RemoteMenu};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

const TOKEN: &str = "memory-token";

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    entries: BTreeMap<u64, RemoteMenu>,
    failing_titles: BTreeSet<String>,
    network_failures: u32,
    calls: Vec<String>,
}

/// A fake CMS holding menu entries in memory.
#[derive(Debug)]
pub struct MemoryMenuApi {
    credentials: ApiCredentials,
    state: Mutex<State>,
}

impl MemoryMenuApi {
    /// Create an empty store that accepts `account` / `password`.
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: ApiCredentials::new(account, password),
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seed an entry as if created by someone else. Returns its id.
    pub fn seed(&self, menu: NewMenu) -> MenuId {
        self.insert(menu).id
    }

    /// Reject creates, updates and deletes of entries with this title.
    pub fn fail_title(&self, title: impl Into<String>) {
        self.state().failing_titles.insert(title.into());
    }

    /// Fail the next `count` calls with a network error.
    pub fn fail_network(&self, count: u32) {
        self.state().network_failures = count;
    }

    /// Snapshot of all entries, ordered by id.
    pub fn entries(&self) -> Vec<RemoteMenu> {
        self.state().entries.values().cloned().collect()
    }

    /// Operation names in call order (`sign_in`, `list`, `create`, ...).
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn insert(&self, menu: NewMenu) -> RemoteMenu {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        let entry = RemoteMenu {
            id: MenuId::new(id.to_string()),
            title: menu.title,
            kind: menu.kind,
            parent_id: menu.parent_id,
            path: menu.path,
            icon: menu.icon,
            sort: menu.sort,
        };
        state.entries.insert(id, entry.clone());
        entry
    }

    /// Record a call and apply injected network failures.
    fn enter(&self, call: &str) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(call.to_string());
        if state.network_failures > 0 {
            state.network_failures -= 1;
            return Err(Error::network("connection reset by peer"));
        }
        Ok(state)
    }

    fn check_token(token: &AuthToken) -> Result<()> {
        if token.as_str() == TOKEN {
            Ok(())
        } else {
            Err(Error::Api {
                operation: "request".to_string(),
                status: 401,
                body: r#"{"errors":[{"message":"Unauthenticated"}]}"#.to_string(),
            })
        }
    }

    fn rejected(operation: &str, title: &str) -> Error {
        Error::Api {
            operation: format!("{operation} '{title}'"),
            status: 400,
            body: r#"{"errors":[{"message":"rejected"}]}"#.to_string(),
        }
    }
}

fn numeric(id: &MenuId) -> Result<u64> {
    id.as_str()
        .parse()
        .map_err(|_| Error::InvalidResponse(format!("unknown id {id}")))
}

impl MenuApi for MemoryMenuApi {
    fn sign_in(&self, credentials: &ApiCredentials) -> Result<AuthToken> {
        drop(self.enter("sign_in")?);
        if credentials.account == self.credentials.account
            && credentials.password == self.credentials.password
        {
            Ok(AuthToken::new(TOKEN))
        } else {
            Err(Error::Auth {
                status: Some(401),
                message: "The username or password is incorrect".to_string(),
            })
        }
    }

    fn list(&self, token: &AuthToken, page_size: usize) -> Result<Listing> {
        let state = self.enter("list")?;
        Self::check_token(token)?;
        Ok(Listing {
            total: Some(state.entries.len()),
            entries: state.entries.values().take(page_size).cloned().collect(),
        })
    }

    fn create(&self, token: &AuthToken, menu: &NewMenu) -> Result<RemoteMenu> {
        {
            let state = self.enter("create")?;
            Self::check_token(token)?;
            if state.failing_titles.contains(&menu.title) {
                return Err(Self::rejected("create", &menu.title));
            }
        }
        Ok(self.insert(menu.clone()))
    }

    fn update(&self, token: &AuthToken, id: &MenuId, patch: &MenuPatch) -> Result<()> {
        let mut state = self.enter("update")?;
        Self::check_token(token)?;
        let key = numeric(id)?;
        let failing = state
            .entries
            .get(&key)
            .is_some_and(|e| state.failing_titles.contains(&e.title));
        let Some(entry) = state.entries.get_mut(&key) else {
            return Err(Error::Api {
                operation: format!("update {id}"),
                status: 404,
                body: "not found".to_string(),
            });
        };
        if failing {
            return Err(Self::rejected("update", &entry.title));
        }
        if let Some(icon) = &patch.icon {
            entry.icon = Some(icon.clone());
        }
        if let Some(sort) = patch.sort {
            entry.sort = Some(sort);
        }
        Ok(())
    }

    fn delete(&self, token: &AuthToken, id: &MenuId) -> Result<()> {
        let mut state = self.enter("delete")?;
        Self::check_token(token)?;
        let key = numeric(id)?;
        if let Some(entry) = state.entries.get(&key)
            && state.failing_titles.contains(&entry.title)
        {
            return Err(Self::rejected("delete", &entry.title));
        }
        // Destroying a missing id is a no-op on the CMS too
        state.entries.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MenuGroup, MenuKind};

    fn api() -> MemoryMenuApi {
        MemoryMenuApi::new("admin", "secret")
    }

    fn group(title: &str) -> NewMenu {
        NewMenu::group(&MenuGroup {
            title: title.to_string(),
            icon: None,
            sort: None,
        })
    }

    #[test]
    fn test_sign_in_checks_credentials() {
        let api = api();
        assert!(api.sign_in(&ApiCredentials::new("admin", "secret")).is_ok());
        let err = api
            .sign_in(&ApiCredentials::new("admin", "wrong"))
            .unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
    }

    #[test]
    fn test_create_assigns_ids() {
        let api = api();
        let token = AuthToken::new(TOKEN);
        let a = api.create(&token, &group("A")).unwrap();
        let b = api.create(&token, &group("B")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, MenuKind::Group);
        assert_eq!(api.entries().len(), 2);
    }

    #[test]
    fn test_list_respects_page_size() {
        let api = api();
        for title in ["A", "B", "C"] {
            api.seed(group(title));
        }
        let listing = api.list(&AuthToken::new(TOKEN), 2).unwrap();
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.total, Some(3));
    }

    #[test]
    fn test_bad_token_rejected() {
        let api = api();
        let err = api.list(&AuthToken::new("nope"), 10).unwrap_err();
        assert!(matches!(err, Error::Api { status: 401, .. }));
    }

    #[test]
    fn test_network_failure_injection() {
        let api = api();
        api.fail_network(1);
        assert!(matches!(
            api.list(&AuthToken::new(TOKEN), 10),
            Err(Error::Network { .. })
        ));
        assert!(api.list(&AuthToken::new(TOKEN), 10).is_ok());
    }

    #[test]
    fn test_failing_title() {
        let api = api();
        api.fail_title("Bad");
        assert!(api.create(&AuthToken::new(TOKEN), &group("Bad")).is_err());
        assert!(api.entries().is_empty());
    }
}
