//! Menu reconciliation.
//!
//! A sync walks five phases in order:
//!
//! 1. **Authenticated**: exchange credentials for a token (fatal on failure)
//! 2. **Listed**: fetch every entry in one page, refusing truncated listings
//! 3. **Purged**: delete owned entries, deepest first
//! 4. **Created**: create the parent, then its links (and, for the diff
//!    strategy, update matched entries in place)
//! 5. **Verified**: list again and compare with the declared tree
//!
//! Purge always finishes before anything is created. Within a phase the
//! calls are independent and may run on a bounded worker pool. Cancellation
//! is checked between phases, never inside one.

use crate::api::MenuApi;
use crate::error::{Error, ErrorCategory, Result};
use crate::retry::{LogCallback, RetryConfig, with_retry};
use crate::types::{
    ApiCredentials, AuthToken, MenuId, MenuKind, MenuLink, MenuPatch, MenuTree, NewMenu, Phase,
    RemoteMenu,
};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// How existing entries are brought in line with the declared tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Delete everything owned, then create the declared set. Ids change
    /// on every run; manual edits to owned entries are lost.
    #[default]
    Recreate,
    /// Match entries by title and path, keep or update them in place,
    /// create what is missing and delete the rest.
    Diff,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recreate => f.write_str("recreate"),
            Self::Diff => f.write_str("diff"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "recreate" => Ok(Self::Recreate),
            "diff" => Ok(Self::Diff),
            other => Err(format!("unknown strategy '{other}' (expected recreate or diff)")),
        }
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub strategy: Strategy,
    /// Page size requested when listing. Must cover every entry.
    pub page_size: usize,
    /// Extra titles to purge, beyond the declared ones.
    pub purge_pattern: Option<String>,
    /// Worker threads for independent calls within a phase.
    pub jobs: usize,
    /// Retry policy for sign-in and listing.
    pub retry: RetryConfig,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            page_size: 1000,
            purge_pattern: None,
            jobs: 1,
            retry: RetryConfig::default(),
        }
    }
}

/// Receives phase transitions.
pub trait PhaseCallback: Sync {
    fn on_phase(&self, phase: Phase, detail: &str);
}

/// Entry scheduled for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDelete {
    pub menu: RemoteMenu,
    /// Distance from the root. Deeper entries are deleted first.
    pub depth: usize,
}

/// Entry to change in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedUpdate {
    pub menu: RemoteMenu,
    pub patch: MenuPatch,
}

/// Link to create under the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedLink {
    pub link: MenuLink,
    pub sort: i64,
}

/// Where the parent group comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedParent {
    Create { menu: NewMenu },
    Existing { menu: RemoteMenu },
}

/// Every mutation a sync would make, computed from one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuPlan {
    pub strategy: Strategy,
    pub delete: Vec<PlannedDelete>,
    pub parent: PlannedParent,
    pub update: Vec<PlannedUpdate>,
    pub create: Vec<PlannedLink>,
    pub keep: Vec<RemoteMenu>,
}

impl MenuPlan {
    /// Compute the plan for `tree` against the current `entries`.
    pub fn compute(
        strategy: Strategy,
        tree: &MenuTree,
        entries: &[RemoteMenu],
        purge_pattern: Option<&Regex>,
    ) -> Self {
        match strategy {
            Strategy::Recreate => plan_recreate(tree, entries, purge_pattern),
            Strategy::Diff => plan_diff(tree, entries, purge_pattern),
        }
    }

    /// Whether applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty()
            && self.update.is_empty()
            && self.create.is_empty()
            && matches!(self.parent, PlannedParent::Existing { .. })
    }
}

/// A call that failed for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub title: String,
    pub operation: &'static str,
    pub error: String,
}

/// Comparison of the server state with the declared tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// Whether the server could be listed after the mutations.
    pub checked: bool,
    /// Parent groups carrying the declared title.
    pub parents: usize,
    /// Declared links present under the parent.
    pub children: usize,
    pub missing: Vec<String>,
    pub duplicates: Vec<String>,
    pub unexpected: Vec<String>,
}

impl Verification {
    /// Compare `entries` against `tree`.
    pub fn check(tree: &MenuTree, entries: &[RemoteMenu]) -> Self {
        let mut verification = Self {
            checked: true,
            ..Self::default()
        };
        let groups: Vec<&RemoteMenu> = entries
            .iter()
            .filter(|e| is_parent_group(e, tree))
            .collect();
        verification.parents = groups.len();

        let Some(parent) = groups.first() else {
            verification.missing.push(tree.parent.title.clone());
            verification
                .missing
                .extend(tree.links.iter().map(|l| l.title.clone()));
            return verification;
        };
        if groups.len() > 1 {
            verification.duplicates.push(tree.parent.title.clone());
        }

        let children: Vec<&RemoteMenu> = entries
            .iter()
            .filter(|e| e.parent_id.as_ref() == Some(&parent.id))
            .collect();
        for link in &tree.links {
            let count = children.iter().filter(|c| matches_link(c, link)).count();
            match count {
                0 => verification.missing.push(link.title.clone()),
                1 => verification.children += 1,
                _ => {
                    verification.children += 1;
                    verification.duplicates.push(link.title.clone());
                }
            }
        }
        verification.unexpected = children
            .iter()
            .filter(|c| !tree.links.iter().any(|l| matches_link(c, l)))
            .map(|c| c.title.clone())
            .collect();
        verification
    }

    /// Exactly the declared set exists.
    pub fn is_clean(&self) -> bool {
        self.checked
            && self.parents == 1
            && self.missing.is_empty()
            && self.duplicates.is_empty()
            && self.unexpected.is_empty()
    }
}

/// Outcome of a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub strategy: Strategy,
    pub phases: Vec<Phase>,
    pub deleted: Vec<String>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub kept: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub verification: Verification,
}

impl ReconcileReport {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            phases: Vec::new(),
            deleted: Vec::new(),
            created: Vec::new(),
            updated: Vec::new(),
            kept: Vec::new(),
            failures: Vec::new(),
            verification: Verification::default(),
        }
    }

    /// No per-entry failure and verification matched.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.verification.is_clean()
    }
}

/// Drives a [`MenuApi`] through the reconciliation phases.
pub struct Reconciler<'a> {
    api: &'a dyn MenuApi,
    options: ReconcileOptions,
    cancel: Option<Arc<AtomicBool>>,
    observer: Option<&'a dyn PhaseCallback>,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn MenuApi, options: ReconcileOptions) -> Self {
        Self {
            api,
            options,
            cancel: None,
            observer: None,
        }
    }

    /// Stop between phases once `flag` is set.
    #[must_use]
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn PhaseCallback) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sign in and return the current entries.
    pub fn list(&self, credentials: &ApiCredentials) -> Result<Vec<RemoteMenu>> {
        let token = self.sign_in(credentials)?;
        self.list_all(&token)
    }

    /// Sign in, list, and compute what a sync would do without mutating.
    pub fn plan(&self, tree: &MenuTree, credentials: &ApiCredentials) -> Result<MenuPlan> {
        tree.validate().map_err(Error::InvalidMenu)?;
        let pattern = self.purge_pattern()?;
        let entries = self.list(credentials)?;
        Ok(MenuPlan::compute(
            self.options.strategy,
            tree,
            &entries,
            pattern.as_ref(),
        ))
    }

    /// Bring the server in line with `tree`.
    pub fn sync(&self, tree: &MenuTree, credentials: &ApiCredentials) -> Result<ReconcileReport> {
        tree.validate().map_err(Error::InvalidMenu)?;
        let pattern = self.purge_pattern()?;
        let mut report = ReconcileReport::new(self.options.strategy);

        let token = self.sign_in(credentials)?;
        self.enter(&mut report, Phase::Authenticated, "signed in")?;

        let entries = self.list_all(&token)?;
        let plan = MenuPlan::compute(self.options.strategy, tree, &entries, pattern.as_ref());
        let listed = format!("{} entries", entries.len());
        self.enter(&mut report, Phase::Listed, &listed)?;

        self.purge(&token, &plan.delete, &mut report)?;
        let purged = format!("{} deleted", report.deleted.len());
        self.enter(&mut report, Phase::Purged, &purged)?;

        self.create(&token, &plan, &mut report)?;
        let created = format!(
            "{} created, {} updated",
            report.created.len(),
            report.updated.len()
        );
        self.enter(&mut report, Phase::Created, &created)?;

        // The server has already changed; a failed re-list is reported on
        // the run instead of discarding what was done.
        match self.list_all(&token) {
            Ok(after) => {
                report.verification = Verification::check(tree, &after);
                if !report.verification.is_clean() {
                    log::warn!("Menu verification mismatch: {:?}", report.verification);
                }
                report.phases.push(Phase::Verified);
                self.notify(Phase::Verified, "compared with declared menu");
            }
            Err(e) if matches!(e.category(), ErrorCategory::Auth | ErrorCategory::Cancelled) => {
                return Err(e);
            }
            Err(e) => {
                log::error!("Cannot verify menu '{}': {e}", tree.parent.title);
                report.failures.push(ItemFailure {
                    title: tree.parent.title.clone(),
                    operation: "verify",
                    error: e.to_string(),
                });
                self.notify(Phase::Verified, "not verified");
            }
        }

        Ok(report)
    }

    fn purge_pattern(&self) -> Result<Option<Regex>> {
        self.options
            .purge_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(Error::from)
    }

    fn sign_in(&self, credentials: &ApiCredentials) -> Result<AuthToken> {
        with_retry(&self.options.retry, Some(&LogCallback), || {
            self.api.sign_in(credentials)
        })
    }

    fn list_all(&self, token: &AuthToken) -> Result<Vec<RemoteMenu>> {
        let listing = with_retry(&self.options.retry, Some(&LogCallback), || {
            self.api.list(token, self.options.page_size)
        })?;
        if let Some(total) = listing.total
            && total > listing.entries.len()
        {
            return Err(Error::Truncated {
                returned: listing.entries.len(),
                total,
            });
        }
        if listing.total.is_none()
            && !listing.entries.is_empty()
            && listing.entries.len() >= self.options.page_size
        {
            return Err(Error::PageFull {
                page_size: self.options.page_size,
            });
        }
        Ok(listing.entries)
    }

    /// Record a completed phase, then honour cancellation.
    fn enter(&self, report: &mut ReconcileReport, phase: Phase, detail: &str) -> Result<()> {
        report.phases.push(phase);
        self.notify(phase, detail);
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(Error::Cancelled { after: phase });
        }
        Ok(())
    }

    fn notify(&self, phase: Phase, detail: &str) {
        log::info!("Menu phase {phase}: {detail}");
        if let Some(observer) = self.observer {
            observer.on_phase(phase, detail);
        }
    }

    fn purge(
        &self,
        token: &AuthToken,
        deletes: &[PlannedDelete],
        report: &mut ReconcileReport,
    ) -> Result<()> {
        // Deletes arrive deepest first; each depth is one parallel wave
        for wave in deletes.chunk_by(|a, b| a.depth == b.depth) {
            let results = self.run_pool(wave, |planned| self.api.delete(token, &planned.menu.id));
            for (planned, result) in wave.iter().zip(results) {
                if self.record(report, &planned.menu.title, "delete", result)? {
                    report.deleted.push(planned.menu.title.clone());
                }
            }
        }
        Ok(())
    }

    fn create(&self, token: &AuthToken, plan: &MenuPlan, report: &mut ReconcileReport) -> Result<()> {
        report.kept.extend(plan.keep.iter().map(|m| m.title.clone()));

        let updates = self.run_pool(&plan.update, |planned| {
            self.api.update(token, &planned.menu.id, &planned.patch)
        });
        for (planned, result) in plan.update.iter().zip(updates) {
            if self.record(report, &planned.menu.title, "update", result)? {
                report.updated.push(planned.menu.title.clone());
            }
        }

        let parent_id = match &plan.parent {
            PlannedParent::Existing { menu } => menu.id.clone(),
            PlannedParent::Create { menu } => match self.api.create(token, menu) {
                Ok(created) => {
                    report.created.push(created.title.clone());
                    created.id
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("Cannot create menu group '{}': {e}", menu.title);
                    report.failures.push(ItemFailure {
                        title: menu.title.clone(),
                        operation: "create",
                        error: e.to_string(),
                    });
                    for planned in &plan.create {
                        report.failures.push(ItemFailure {
                            title: planned.link.title.clone(),
                            operation: "create",
                            error: "parent group was not created".to_string(),
                        });
                    }
                    return Ok(());
                }
            },
        };

        let creates = self.run_pool(&plan.create, |planned| {
            let menu = NewMenu::link(&planned.link, parent_id.clone(), planned.sort);
            self.api.create(token, &menu).map(|_| ())
        });
        for (planned, result) in plan.create.iter().zip(creates) {
            if self.record(report, &planned.link.title, "create", result)? {
                report.created.push(planned.link.title.clone());
            }
        }
        Ok(())
    }

    /// Record one call's outcome. Returns `Ok(true)` on success, `Ok(false)`
    /// for a per-entry failure, and `Err` for errors that end the run.
    fn record(
        &self,
        report: &mut ReconcileReport,
        title: &str,
        operation: &'static str,
        result: Result<()>,
    ) -> Result<bool> {
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log::error!("Cannot {operation} menu '{title}': {e}");
                report.failures.push(ItemFailure {
                    title: title.to_string(),
                    operation,
                    error: e.to_string(),
                });
                Ok(false)
            }
        }
    }

    /// Run independent calls on at most `jobs` threads, preserving order.
    fn run_pool<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        if self.options.jobs <= 1 || items.len() <= 1 {
            return items.iter().map(f).collect();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
        {
            Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
            Err(e) => {
                log::warn!("Failed to create thread pool, running sequentially: {e}");
                items.iter().map(f).collect()
            }
        }
    }
}

fn is_parent_group(entry: &RemoteMenu, tree: &MenuTree) -> bool {
    entry.kind == MenuKind::Group && entry.parent_id.is_none() && entry.title == tree.parent.title
}

fn matches_link(entry: &RemoteMenu, link: &MenuLink) -> bool {
    entry.key() == (link.title.as_str(), Some(link.path.as_str()))
}

/// Entries this tool owns: declared titles, or titles matching the pattern.
fn is_owned(entry: &RemoteMenu, tree: &MenuTree, pattern: Option<&Regex>) -> bool {
    tree.titles().contains(&entry.title.as_str())
        || pattern.is_some_and(|p| p.is_match(&entry.title))
}

/// Declared value if it differs from the current one.
fn changed<T: PartialEq + Clone>(declared: Option<&T>, current: Option<&T>) -> Option<T> {
    declared.filter(|d| current != Some(*d)).cloned()
}

/// Close `roots` over the parent relation.
fn with_descendants(entries: &[RemoteMenu], roots: BTreeSet<MenuId>) -> BTreeSet<MenuId> {
    let mut doomed = roots;
    loop {
        let before = doomed.len();
        for entry in entries {
            if let Some(parent) = &entry.parent_id
                && doomed.contains(parent)
            {
                doomed.insert(entry.id.clone());
            }
        }
        if doomed.len() == before {
            return doomed;
        }
    }
}

fn depth(entry: &RemoteMenu, by_id: &BTreeMap<&MenuId, &RemoteMenu>) -> usize {
    let mut depth = 0;
    let mut current = entry.parent_id.as_ref();
    // Bounded walk in case the server reports a cycle
    while let Some(id) = current {
        if depth >= by_id.len() {
            break;
        }
        depth += 1;
        current = by_id.get(id).and_then(|p| p.parent_id.as_ref());
    }
    depth
}

/// Deletions ordered deepest first, then by listing order.
fn ordered_deletes(entries: &[RemoteMenu], doomed: &BTreeSet<MenuId>) -> Vec<PlannedDelete> {
    let by_id: BTreeMap<&MenuId, &RemoteMenu> = entries.iter().map(|e| (&e.id, e)).collect();
    let mut deletes: Vec<PlannedDelete> = entries
        .iter()
        .filter(|e| doomed.contains(&e.id))
        .map(|e| PlannedDelete {
            menu: e.clone(),
            depth: depth(e, &by_id),
        })
        .collect();
    deletes.sort_by(|a, b| b.depth.cmp(&a.depth));
    deletes
}

fn plan_recreate(tree: &MenuTree, entries: &[RemoteMenu], pattern: Option<&Regex>) -> MenuPlan {
    let roots = entries
        .iter()
        .filter(|e| is_owned(e, tree, pattern))
        .map(|e| e.id.clone())
        .collect();
    let doomed = with_descendants(entries, roots);

    MenuPlan {
        strategy: Strategy::Recreate,
        delete: ordered_deletes(entries, &doomed),
        parent: PlannedParent::Create {
            menu: NewMenu::group(&tree.parent),
        },
        update: Vec::new(),
        create: tree
            .links
            .iter()
            .enumerate()
            .map(|(i, link)| PlannedLink {
                link: link.clone(),
                sort: MenuTree::link_sort(i),
            })
            .collect(),
        keep: Vec::new(),
    }
}

fn plan_diff(tree: &MenuTree, entries: &[RemoteMenu], pattern: Option<&Regex>) -> MenuPlan {
    let mut claimed: BTreeSet<MenuId> = BTreeSet::new();
    let mut update = Vec::new();
    let mut keep = Vec::new();
    let mut create = Vec::new();

    let existing = entries.iter().find(|e| is_parent_group(e, tree));
    let parent = match existing {
        Some(group) => {
            claimed.insert(group.id.clone());
            let patch = MenuPatch {
                icon: changed(tree.parent.icon.as_ref(), group.icon.as_ref()),
                sort: changed(tree.parent.sort.as_ref(), group.sort.as_ref()),
            };
            if patch.is_empty() {
                keep.push(group.clone());
            } else {
                update.push(PlannedUpdate {
                    menu: group.clone(),
                    patch,
                });
            }
            PlannedParent::Existing {
                menu: group.clone(),
            }
        }
        None => PlannedParent::Create {
            menu: NewMenu::group(&tree.parent),
        },
    };

    for (i, link) in tree.links.iter().enumerate() {
        let sort = MenuTree::link_sort(i);
        let found = existing.and_then(|group| {
            entries.iter().find(|e| {
                e.parent_id.as_ref() == Some(&group.id)
                    && !claimed.contains(&e.id)
                    && matches_link(e, link)
            })
        });
        match found {
            Some(entry) => {
                claimed.insert(entry.id.clone());
                let patch = MenuPatch {
                    icon: changed(link.icon.as_ref(), entry.icon.as_ref()),
                    sort: changed(Some(&sort), entry.sort.as_ref()),
                };
                if patch.is_empty() {
                    keep.push(entry.clone());
                } else {
                    update.push(PlannedUpdate {
                        menu: entry.clone(),
                        patch,
                    });
                }
            }
            None => create.push(PlannedLink {
                link: link.clone(),
                sort,
            }),
        }
    }

    // Orphans under the kept parent, plus owned entries matched nowhere
    let roots = entries
        .iter()
        .filter(|e| !claimed.contains(&e.id))
        .filter(|e| {
            is_owned(e, tree, pattern)
                || existing.is_some_and(|group| e.parent_id.as_ref() == Some(&group.id))
        })
        .map(|e| e.id.clone())
        .collect();
    let mut doomed = with_descendants(entries, roots);
    doomed.retain(|id| !claimed.contains(id));

    MenuPlan {
        strategy: Strategy::Diff,
        delete: ordered_deletes(entries, &doomed),
        parent,
        update,
        create,
        keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMenuApi;
    use crate::types::{Listing, MenuGroup, MenuPatch};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn creds() -> ApiCredentials {
        ApiCredentials::new("admin", "secret")
    }

    fn tree() -> MenuTree {
        MenuTree::new("Talent").with_link("Skills", "/admin/x/skills")
    }

    fn options(strategy: Strategy) -> ReconcileOptions {
        ReconcileOptions {
            strategy,
            retry: RetryConfig {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                backoff_factor: 1.0,
                max_delay: Duration::from_millis(1),
            },
            ..Default::default()
        }
    }

    fn group(title: &str) -> NewMenu {
        NewMenu::group(&MenuGroup {
            title: title.to_string(),
            icon: None,
            sort: None,
        })
    }

    fn link(title: &str, path: &str, parent: &MenuId) -> NewMenu {
        NewMenu::link(
            &MenuLink {
                title: title.to_string(),
                path: path.to_string(),
                icon: None,
            },
            parent.clone(),
            1,
        )
    }

    fn shape(api: &MemoryMenuApi) -> (usize, usize) {
        let entries = api.entries();
        let groups = entries.iter().filter(|e| e.kind == MenuKind::Group).count();
        let links = entries.iter().filter(|e| e.kind == MenuKind::Link).count();
        (groups, links)
    }

    #[test]
    fn test_sync_on_empty_server_creates_parent_and_child() {
        let api = MemoryMenuApi::new("admin", "secret");
        let report = Reconciler::new(&api, options(Strategy::Recreate))
            .sync(&tree(), &creds())
            .unwrap();

        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.created, vec!["Talent", "Skills"]);
        assert_eq!(
            report.phases,
            vec![
                Phase::Authenticated,
                Phase::Listed,
                Phase::Purged,
                Phase::Created,
                Phase::Verified
            ]
        );
        assert_eq!(shape(&api), (1, 1));
        let child = api
            .entries()
            .into_iter()
            .find(|e| e.title == "Skills")
            .unwrap();
        assert_eq!(child.path.as_deref(), Some("/admin/x/skills"));
    }

    #[test]
    fn test_recreate_twice_leaves_one_parent_one_child() {
        let api = MemoryMenuApi::new("admin", "secret");
        let reconciler = Reconciler::new(&api, options(Strategy::Recreate));
        reconciler.sync(&tree(), &creds()).unwrap();
        let second = reconciler.sync(&tree(), &creds()).unwrap();

        assert_eq!(second.deleted.len(), 2);
        assert!(second.verification.is_clean());
        assert_eq!(shape(&api), (1, 1));
    }

    #[test]
    fn test_diff_twice_keeps_ids() {
        let api = MemoryMenuApi::new("admin", "secret");
        let reconciler = Reconciler::new(&api, options(Strategy::Diff));
        reconciler.sync(&tree(), &creds()).unwrap();
        let ids: Vec<MenuId> = api.entries().into_iter().map(|e| e.id).collect();

        let second = reconciler.sync(&tree(), &creds()).unwrap();

        assert!(second.deleted.is_empty());
        assert!(second.created.is_empty());
        assert_eq!(second.kept, vec!["Talent", "Skills"]);
        let after: Vec<MenuId> = api.entries().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, after);
    }

    #[test]
    fn test_recreate_removes_duplicates_and_their_children() {
        let api = MemoryMenuApi::new("admin", "secret");
        let first = api.seed(group("Talent"));
        let second = api.seed(group("Talent"));
        api.seed(link("Skills", "/admin/x/skills", &first));
        api.seed(link("Old", "/admin/x/old", &second));
        api.seed(group("Unrelated"));

        let report = Reconciler::new(&api, options(Strategy::Recreate))
            .sync(&tree(), &creds())
            .unwrap();

        assert!(report.is_success(), "{report:?}");
        let titles: Vec<String> = api.entries().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Unrelated", "Talent", "Skills"]);
    }

    #[test]
    fn test_children_deleted_before_parent() {
        let api = MemoryMenuApi::new("admin", "secret");
        let parent = api.seed(group("Talent"));
        api.seed(link("Skills", "/admin/x/skills", &parent));

        let plan = Reconciler::new(&api, options(Strategy::Recreate))
            .plan(&tree(), &creds())
            .unwrap();

        let order: Vec<&str> = plan.delete.iter().map(|d| d.menu.title.as_str()).collect();
        assert_eq!(order, vec!["Skills", "Talent"]);
    }

    #[test]
    fn test_diff_updates_sort_and_removes_orphans() {
        let api = MemoryMenuApi::new("admin", "secret");
        let parent = api.seed(group("Talent"));
        api.seed(link("Stale", "/admin/x/stale", &parent));
        let mut skills = link("Skills", "/admin/x/skills", &parent);
        skills.sort = Some(9);
        api.seed(skills);

        let report = Reconciler::new(&api, options(Strategy::Diff))
            .sync(&tree(), &creds())
            .unwrap();

        assert_eq!(report.deleted, vec!["Stale"]);
        assert_eq!(report.updated, vec!["Skills"]);
        assert!(report.created.is_empty());
        assert!(report.verification.is_clean());
    }

    #[test]
    fn test_purge_pattern_extends_ownership() {
        let api = MemoryMenuApi::new("admin", "secret");
        api.seed(group("Talent (old)"));
        let opts = ReconcileOptions {
            purge_pattern: Some("^Talent".to_string()),
            ..options(Strategy::Recreate)
        };

        Reconciler::new(&api, opts).sync(&tree(), &creds()).unwrap();

        assert!(api.entries().iter().all(|e| e.title != "Talent (old)"));
    }

    #[test]
    fn test_bad_credentials_abort_before_any_mutation() {
        let api = MemoryMenuApi::new("admin", "secret");
        let err = Reconciler::new(&api, options(Strategy::Recreate))
            .sync(&tree(), &ApiCredentials::new("admin", "wrong"))
            .unwrap_err();

        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(api.calls(), vec!["sign_in"]);
    }

    #[test]
    fn test_per_entry_failure_is_skipped() {
        let api = MemoryMenuApi::new("admin", "secret");
        api.fail_title("Roles");
        let tree = tree().with_link("Roles", "/admin/x/roles");

        let report = Reconciler::new(&api, options(Strategy::Recreate))
            .sync(&tree, &creds())
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].title, "Roles");
        assert_eq!(report.created, vec!["Talent", "Skills"]);
        assert_eq!(report.verification.missing, vec!["Roles"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_failed_parent_skips_children() {
        let api = MemoryMenuApi::new("admin", "secret");
        api.fail_title("Talent");

        let report = Reconciler::new(&api, options(Strategy::Recreate))
            .sync(&tree(), &creds())
            .unwrap();

        assert_eq!(report.failures.len(), 2);
        assert!(report.created.is_empty());
        assert_eq!(shape(&api), (0, 0));
    }

    #[test]
    fn test_transient_list_failure_is_retried() {
        let api = MemoryMenuApi::new("admin", "secret");
        let token = api.sign_in(&creds()).unwrap();
        api.fail_network(1);

        let reconciler = Reconciler::new(&api, options(Strategy::Recreate));
        assert!(reconciler.list_all(&token).is_ok());
    }

    #[test]
    fn test_truncated_listing_is_an_error() {
        let api = MemoryMenuApi::new("admin", "secret");
        for title in ["A", "B", "C"] {
            api.seed(group(title));
        }
        let opts = ReconcileOptions {
            page_size: 2,
            ..options(Strategy::Recreate)
        };

        let err = Reconciler::new(&api, opts)
            .sync(&tree(), &creds())
            .unwrap_err();

        assert!(matches!(err, Error::Truncated { returned: 2, total: 3 }));
        assert!(!api.calls().contains(&"delete".to_string()));
    }

    #[test]
    fn test_cancel_stops_between_phases() {
        let api = MemoryMenuApi::new("admin", "secret");
        let flag = Arc::new(AtomicBool::new(true));

        let err = Reconciler::new(&api, options(Strategy::Recreate))
            .with_cancel(flag)
            .sync(&tree(), &creds())
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Cancelled {
                after: Phase::Authenticated
            }
        ));
        assert_eq!(api.calls(), vec!["sign_in"]);
    }

    #[test]
    fn test_parallel_jobs_match_sequential_result() {
        let api = MemoryMenuApi::new("admin", "secret");
        let tree = MenuTree::new("Talent")
            .with_link("A", "/a")
            .with_link("B", "/b")
            .with_link("C", "/c")
            .with_link("D", "/d");
        let opts = ReconcileOptions {
            jobs: 4,
            ..options(Strategy::Recreate)
        };
        let reconciler = Reconciler::new(&api, opts);

        reconciler.sync(&tree, &creds()).unwrap();
        let report = reconciler.sync(&tree, &creds()).unwrap();

        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.created, vec!["Talent", "A", "B", "C", "D"]);
        assert_eq!(shape(&api), (1, 4));
    }

    #[test]
    fn test_plan_is_noop_after_diff_sync() {
        let api = MemoryMenuApi::new("admin", "secret");
        let reconciler = Reconciler::new(&api, options(Strategy::Diff));
        reconciler.sync(&tree(), &creds()).unwrap();

        let plan = reconciler.plan(&tree(), &creds()).unwrap();
        assert!(plan.is_noop(), "{plan:?}");
    }

    #[test]
    fn test_verification_reports_unexpected_child() {
        let entries = vec![
            RemoteMenu {
                id: MenuId::new("1"),
                title: "Talent".to_string(),
                kind: MenuKind::Group,
                parent_id: None,
                path: None,
                icon: None,
                sort: None,
            },
            RemoteMenu {
                id: MenuId::new("2"),
                title: "Extra".to_string(),
                kind: MenuKind::Link,
                parent_id: Some(MenuId::new("1")),
                path: Some("/extra".to_string()),
                icon: None,
                sort: None,
            },
        ];
        let verification = Verification::check(&tree(), &entries);
        assert_eq!(verification.parents, 1);
        assert_eq!(verification.missing, vec!["Skills"]);
        assert_eq!(verification.unexpected, vec!["Extra"]);
    }

    /// Delegates to a memory store, failing selected calls.
    struct Unreliable {
        inner: MemoryMenuApi,
        lists: AtomicUsize,
        fail_list_from: usize,
        garbled_title: Option<String>,
        hide_total: bool,
    }

    impl Unreliable {
        fn new(inner: MemoryMenuApi) -> Self {
            Self {
                inner,
                lists: AtomicUsize::new(0),
                fail_list_from: usize::MAX,
                garbled_title: None,
                hide_total: false,
            }
        }
    }

    impl MenuApi for Unreliable {
        fn sign_in(&self, credentials: &ApiCredentials) -> Result<AuthToken> {
            self.inner.sign_in(credentials)
        }

        fn list(&self, token: &AuthToken, page_size: usize) -> Result<Listing> {
            let call = self.lists.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.fail_list_from {
                return Err(Error::Api {
                    operation: "list".to_string(),
                    status: 500,
                    body: "internal error".to_string(),
                });
            }
            let mut listing = self.inner.list(token, page_size)?;
            if self.hide_total {
                listing.total = None;
            }
            Ok(listing)
        }

        fn create(&self, token: &AuthToken, menu: &NewMenu) -> Result<RemoteMenu> {
            let created = self.inner.create(token, menu)?;
            if self.garbled_title.as_deref() == Some(menu.title.as_str()) {
                return Err(Error::InvalidResponse("missing data.id".to_string()));
            }
            Ok(created)
        }

        fn update(&self, token: &AuthToken, id: &MenuId, patch: &MenuPatch) -> Result<()> {
            self.inner.update(token, id, patch)
        }

        fn delete(&self, token: &AuthToken, id: &MenuId) -> Result<()> {
            self.inner.delete(token, id)
        }
    }

    #[test]
    fn test_failed_verification_keeps_report() {
        let api = Unreliable {
            fail_list_from: 2,
            ..Unreliable::new(MemoryMenuApi::new("admin", "secret"))
        };
        let opts = ReconcileOptions {
            retry: RetryConfig::no_retry(),
            ..options(Strategy::Recreate)
        };

        let report = Reconciler::new(&api, opts)
            .sync(&tree(), &creds())
            .unwrap();

        assert_eq!(report.created, vec!["Talent", "Skills"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].operation, "verify");
        assert_eq!(report.failures[0].title, "Talent");
        assert!(!report.verification.checked);
        assert!(!report.is_success());
        assert!(!report.phases.contains(&Phase::Verified));
        assert_eq!(api.inner.entries().len(), 2);
    }

    #[test]
    fn test_malformed_create_response_is_per_entry() {
        let api = Unreliable {
            garbled_title: Some("Skills".to_string()),
            ..Unreliable::new(MemoryMenuApi::new("admin", "secret"))
        };
        let tree = tree().with_link("Offers", "/admin/x/offers");

        let report = Reconciler::new(&api, options(Strategy::Recreate))
            .sync(&tree, &creds())
            .unwrap();

        assert_eq!(report.created, vec!["Talent", "Offers"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].title, "Skills");
        assert!(report.verification.checked);
    }

    #[test]
    fn test_full_page_without_total_is_an_error() {
        let inner = MemoryMenuApi::new("admin", "secret");
        for title in ["A", "B"] {
            inner.seed(group(title));
        }
        let api = Unreliable {
            hide_total: true,
            ..Unreliable::new(inner)
        };
        let opts = ReconcileOptions {
            page_size: 2,
            ..options(Strategy::Recreate)
        };

        let err = Reconciler::new(&api, opts)
            .sync(&tree(), &creds())
            .unwrap_err();

        assert!(matches!(err, Error::PageFull { page_size: 2 }));
        assert!(!api.inner.calls().contains(&"delete".to_string()));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("diff".parse::<Strategy>().unwrap(), Strategy::Diff);
        assert!("merge".parse::<Strategy>().is_err());
    }
}
