//! Model listing and selection against the Copilot `/models` endpoint.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::auth::{Credential, TokenSource};
use crate::config::{DEFAULT_MODEL, Endpoints};
use crate::error::{AuthError, ModelError};
use crate::http::{self, sanitize_error_body};

/// Capability tag of models that can serve chat completions.
pub const CHAT_CAPABILITY: &str = "chat";

/// A model offered to the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub display_name: String,
    pub vendor: String,
    pub version: Option<String>,
    pub family: Option<String>,
    pub max_output_tokens: Option<u64>,
    pub capabilities: BTreeSet<String>,
}

impl Model {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_chat(&self) -> bool {
        self.supports(CHAT_CAPABILITY)
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ApiModel>,
}

#[derive(Deserialize)]
struct ApiModel {
    id: String,
    name: Option<String>,
    vendor: Option<String>,
    version: Option<String>,
    #[serde(default)]
    capabilities: ApiCapabilities,
}

#[derive(Deserialize, Default)]
struct ApiCapabilities {
    family: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    limits: ApiLimits,
    #[serde(default)]
    supports: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct ApiLimits {
    max_output_tokens: Option<u64>,
}

impl From<ApiModel> for Model {
    fn from(api: ApiModel) -> Self {
        let mut capabilities: BTreeSet<String> = api
            .capabilities
            .supports
            .iter()
            .filter(|(_, v)| v.as_bool() == Some(true))
            .map(|(k, _)| k.clone())
            .collect();
        if let Some(kind) = api.capabilities.kind {
            capabilities.insert(kind);
        }

        Self {
            display_name: api.name.unwrap_or_else(|| api.id.clone()),
            id: api.id,
            vendor: api.vendor.unwrap_or_default(),
            version: api.version,
            family: api.capabilities.family,
            max_output_tokens: api.capabilities.limits.max_output_tokens,
            capabilities,
        }
    }
}

/// Picks the model a commit run should use.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve_model(&self, selection: Option<&str>) -> Result<Model, ModelError>;
}

/// Models available to the signed-in account, fetched once per process.
pub struct ModelCatalog {
    client: reqwest::Client,
    endpoints: Endpoints,
    tokens: Arc<dyn TokenSource>,
    default_model: Option<String>,
    cache: OnceCell<Vec<Model>>,
}

impl ModelCatalog {
    /// `default_model` is the configured default, if any.
    pub fn new(
        client: reqwest::Client,
        endpoints: Endpoints,
        tokens: Arc<dyn TokenSource>,
        default_model: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoints,
            tokens,
            default_model,
            cache: OnceCell::new(),
        }
    }

    /// All models in provider order. Only the first successful fetch hits the network.
    pub async fn list_models(&self) -> Result<&[Model], ModelError> {
        let models = self.cache.get_or_try_init(|| self.fetch()).await?;
        Ok(models.as_slice())
    }

    /// Find a model by id or display name.
    ///
    /// With no selection, the configured default is used, then
    /// [`DEFAULT_MODEL`], then the first chat-capable model.
    pub async fn resolve(&self, selection: Option<&str>) -> Result<Model, ModelError> {
        let models = self.list_models().await?;

        if let Some(name) = selection.or(self.default_model.as_deref()) {
            return find_model(models, name)
                .cloned()
                .ok_or_else(|| ModelError::UnknownModel(name.to_string()));
        }

        find_model(models, DEFAULT_MODEL)
            .or_else(|| models.iter().find(|m| m.is_chat()))
            .cloned()
            .ok_or(ModelError::NoModelsAvailable)
    }

    async fn fetch(&self) -> Result<Vec<Model>, ModelError> {
        let credential = self.tokens.valid_token().await?;
        let resp = match self.request(&credential).await? {
            resp if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                debug!("Model listing rejected the token, refreshing once");
                let credential = self.tokens.refreshed_token().await?;
                let resp = self.request(&credential).await?;
                if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                    return Err(ModelError::Auth(AuthError::AuthExpired));
                }
                resp
            }
            resp => resp,
        };

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status,
                body: sanitize_error_body(&body),
            });
        }

        let listing: ModelsResponse = resp.json().await.map_err(ModelError::Http)?;
        let models: Vec<Model> = listing.data.into_iter().map(Model::from).collect();
        debug!("Fetched {} models", models.len());
        Ok(models)
    }

    async fn request(&self, credential: &Credential) -> Result<reqwest::Response, ModelError> {
        let url = format!("{}/models", self.endpoints.copilot_api_url);
        http::with_editor_headers(self.client.get(&url))
            .header("Authorization", credential.authorization())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ModelError::Http)
    }
}

#[async_trait]
impl ModelResolver for ModelCatalog {
    async fn resolve_model(&self, selection: Option<&str>) -> Result<Model, ModelError> {
        self.resolve(selection).await
    }
}

/// Exact id first, then case-insensitive display name or id.
fn find_model<'a>(models: &'a [Model], name: &str) -> Option<&'a Model> {
    models.iter().find(|m| m.id == name).or_else(|| {
        models
            .iter()
            .find(|m| m.display_name.eq_ignore_ascii_case(name) || m.id.eq_ignore_ascii_case(name))
    })
}
