//! The remote menu store.

use crate::error::Result;
use crate::types::{ApiCredentials, AuthToken, Listing, MenuId, MenuPatch, NewMenu, RemoteMenu};

/// Operations the reconciler needs from the CMS.
///
/// Implementations must be shareable across worker threads; the
/// reconciler issues independent deletes and creates concurrently.
pub trait MenuApi: Send + Sync {
    /// Exchange credentials for a bearer token.
    fn sign_in(&self, credentials: &ApiCredentials) -> Result<AuthToken>;

    /// List every entry, up to `page_size`.
    fn list(&self, token: &AuthToken, page_size: usize) -> Result<Listing>;

    /// Create an entry and return it with its server id.
    fn create(&self, token: &AuthToken, menu: &NewMenu) -> Result<RemoteMenu>;

    /// Change an existing entry in place.
    fn update(&self, token: &AuthToken, id: &MenuId, patch: &MenuPatch) -> Result<()>;

    /// Delete an entry.
    fn delete(&self, token: &AuthToken, id: &MenuId) -> Result<()>;
}
