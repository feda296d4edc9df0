//! REST client for the CMS route resource.
//!
//! Every request goes through one `ureq` agent with a global per-call
//! timeout. Non-2xx answers are read rather than raised by the agent so the
//! server's error body ends up in [`Error::Api`].

use crate::api::MenuApi;
use crate::error::{Error, Result};
use crate::types::{
    ApiCredentials, AuthToken, Listing, MenuId, MenuKind, MenuPatch, NewMenu, RemoteMenu,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Endpoint paths, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub sign_in: String,
    pub list: String,
    pub create: String,
    pub update: String,
    pub destroy: String,
    /// Value of the `X-Authenticator` header sent with sign-in.
    pub authenticator: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            sign_in: "/api/auth:signIn".to_string(),
            list: "/api/desktopRoutes:list".to_string(),
            create: "/api/desktopRoutes:create".to_string(),
            update: "/api/desktopRoutes:update".to_string(),
            destroy: "/api/desktopRoutes:destroy".to_string(),
            authenticator: "basic".to_string(),
        }
    }
}

/// Blocking HTTP implementation of [`MenuApi`].
pub struct HttpMenuApi {
    agent: ureq::Agent,
    base_url: String,
    endpoints: Endpoints,
}

impl HttpMenuApi {
    /// Create a client for `base_url` (e.g. `https://cms.example.com`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints: Endpoints::default(),
        }
    }

    /// Override endpoint paths.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Get the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Read a response body, turning non-2xx into `Err((status, body))`.
fn read_body(
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<std::result::Result<String, (u16, String)>> {
    let status = response.status();
    let body = response.body_mut().read_to_string()?;
    if status.is_success() {
        Ok(Ok(body))
    } else {
        Ok(Err((status.as_u16(), body)))
    }
}

fn api_error(operation: &str, (status, body): (u16, String)) -> Error {
    Error::Api {
        operation: operation.to_string(),
        status,
        body: body.trim().to_string(),
    }
}

/// `{"data": ...}` envelope used by every endpoint.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Deserialize)]
struct ListMeta {
    count: Option<usize>,
}

#[derive(Deserialize)]
struct SignInData {
    token: Option<String>,
}

/// Route record as the CMS stores it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoute {
    id: MenuId,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    parent_id: Option<MenuId>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    sort: Option<i64>,
    #[serde(default)]
    options: Option<Value>,
}

impl From<WireRoute> for RemoteMenu {
    fn from(wire: WireRoute) -> Self {
        let path = wire
            .options
            .as_ref()
            .and_then(|o| o.get("href"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let kind = match wire.kind.as_deref() {
            Some("group") => MenuKind::Group,
            _ => MenuKind::Link,
        };
        Self {
            id: wire.id,
            title: wire.title.unwrap_or_default(),
            kind,
            parent_id: wire.parent_id,
            path,
            icon: wire.icon,
            sort: wire.sort,
        }
    }
}

fn create_body(menu: &NewMenu) -> Value {
    let mut body = Map::new();
    body.insert("type".to_string(), json!(menu.kind.as_str()));
    body.insert("title".to_string(), json!(menu.title));
    if let Some(parent) = &menu.parent_id {
        body.insert("parentId".to_string(), json!(parent));
    }
    if let Some(icon) = &menu.icon {
        body.insert("icon".to_string(), json!(icon));
    }
    if let Some(sort) = menu.sort {
        body.insert("sort".to_string(), json!(sort));
    }
    if let Some(path) = &menu.path {
        body.insert("options".to_string(), json!({ "href": path }));
    }
    Value::Object(body)
}

fn patch_body(patch: &MenuPatch) -> Value {
    let mut body = Map::new();
    if let Some(icon) = &patch.icon {
        body.insert("icon".to_string(), json!(icon));
    }
    if let Some(sort) = patch.sort {
        body.insert("sort".to_string(), json!(sort));
    }
    Value::Object(body)
}

fn bearer(token: &AuthToken) -> String {
    format!("Bearer {}", token.as_str())
}

impl MenuApi for HttpMenuApi {
    fn sign_in(&self, credentials: &ApiCredentials) -> Result<AuthToken> {
        let response = self
            .agent
            .post(&self.url(&self.endpoints.sign_in))
            .header("X-Authenticator", &self.endpoints.authenticator)
            .send_json(json!({
                "account": credentials.account,
                "password": credentials.password,
            }))?;

        let body = read_body(response)?.map_err(|(status, body)| Error::Auth {
            status: Some(status),
            message: body.trim().to_string(),
        })?;
        let envelope: Envelope<SignInData> = serde_json::from_str(&body)?;
        match envelope.data.token {
            Some(token) if !token.is_empty() => Ok(AuthToken::new(token)),
            _ => Err(Error::Auth {
                status: None,
                message: "response carried no token".to_string(),
            }),
        }
    }

    fn list(&self, token: &AuthToken, page_size: usize) -> Result<Listing> {
        let response = self
            .agent
            .get(&self.url(&self.endpoints.list))
            .header("Authorization", &bearer(token))
            .query("pageSize", page_size.to_string())
            .query("sort", "sort")
            .call()?;

        let body = read_body(response)?.map_err(|e| api_error("list", e))?;
        let envelope: Envelope<Vec<WireRoute>> = serde_json::from_str(&body)?;
        Ok(Listing {
            total: envelope.meta.and_then(|m| m.count),
            entries: envelope.data.into_iter().map(Into::into).collect(),
        })
    }

    fn create(&self, token: &AuthToken, menu: &NewMenu) -> Result<RemoteMenu> {
        let operation = format!("create '{}'", menu.title);
        let response = self
            .agent
            .post(&self.url(&self.endpoints.create))
            .header("Authorization", &bearer(token))
            .send_json(create_body(menu))?;

        let body = read_body(response)?.map_err(|e| api_error(&operation, e))?;
        let envelope: Envelope<WireRoute> = serde_json::from_str(&body)?;
        let mut created = RemoteMenu::from(envelope.data);
        // Some versions echo only the id
        if created.title.is_empty() {
            created.title.clone_from(&menu.title);
            created.kind = menu.kind;
            created.parent_id.clone_from(&menu.parent_id);
            created.path.clone_from(&menu.path);
            created.icon.clone_from(&menu.icon);
            created.sort = menu.sort;
        }
        Ok(created)
    }

    fn update(&self, token: &AuthToken, id: &MenuId, patch: &MenuPatch) -> Result<()> {
        let response = self
            .agent
            .post(&self.url(&self.endpoints.update))
            .header("Authorization", &bearer(token))
            .query("filterByTk", id.as_str())
            .send_json(patch_body(patch))?;

        read_body(response)?.map_err(|e| api_error(&format!("update {id}"), e))?;
        Ok(())
    }

    fn delete(&self, token: &AuthToken, id: &MenuId) -> Result<()> {
        let response = self
            .agent
            .post(&self.url(&self.endpoints.destroy))
            .header("Authorization", &bearer(token))
            .query("filterByTk", id.as_str())
            .send_empty()?;

        read_body(response)?.map_err(|e| api_error(&format!("delete {id}"), e))?;
        Ok(())
    }
}
