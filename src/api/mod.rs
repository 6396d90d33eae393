use async_trait::async_trait;
use reqwest::{Client, Method, Request, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::Api;
use crate::model::{
    ApproveOutreach, BulkGenerate, Campaign, CampaignGenerate, EditOutreach, GenerateCounts,
    ListQuery, OutreachItem, RejectOutreach, SingleGenerate, User,
};
use crate::session::Session;

pub mod error;
pub mod model;

pub use error::ApiError;
pub use model::{LoginRequest, LoginResponse};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Remote operations the desk depends on.
#[async_trait]
pub trait OutreachService: Send + Sync {
    async fn list_outreach(&self, query: &ListQuery) -> Result<Vec<OutreachItem>, ApiError>;

    async fn list_pending(&self, limit: Option<u32>) -> Result<Vec<OutreachItem>, ApiError>;

    async fn get_outreach(&self, id: i64) -> Result<OutreachItem, ApiError>;

    async fn edit_outreach(&self, id: i64, edit: &EditOutreach) -> Result<OutreachItem, ApiError>;

    async fn approve_outreach(
        &self,
        id: i64,
        approve: &ApproveOutreach,
    ) -> Result<OutreachItem, ApiError>;

    async fn reject_outreach(
        &self,
        id: i64,
        reject: &RejectOutreach,
    ) -> Result<OutreachItem, ApiError>;

    async fn send_outreach(&self, id: i64) -> Result<OutreachItem, ApiError>;

    async fn generate_bulk(&self, req: &BulkGenerate) -> Result<GenerateCounts, ApiError>;

    async fn generate_for_campaign(
        &self,
        req: &CampaignGenerate,
    ) -> Result<GenerateCounts, ApiError>;

    async fn generate_single(&self, req: &SingleGenerate) -> Result<GenerateCounts, ApiError>;

    async fn list_campaigns(&self) -> Result<Vec<Campaign>, ApiError>;
}

#[derive(Clone)]
pub struct OutreachClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    session: Arc<Session>,
}

impl fmt::Debug for OutreachClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutreachClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OutreachClient {
    pub fn from_config(api: &Api, session: Arc<Session>) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(&api.base_url).map_err(|e| ApiError::Request(e.to_string()))?;
        let http = Client::builder()
            .user_agent(concat!("outreach-desk/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(api.timeout_secs))
            .no_proxy()
            .build()
            .map_err(ApiError::from_reqwest)?;
        Ok(Self::with_http(
            http,
            base_url,
            api.api_key.clone(),
            session,
        ))
    }

    pub fn with_http(
        http: Client,
        base_url: Url,
        api_key: Option<String>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            http,
            base_url: with_trailing_slash(base_url),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            session,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Request(format!("{path}: {e}")))
    }

    /// Bearer token from the session wins over the configured API key.
    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let builder = self.http.request(method, self.endpoint(path)?);
        let builder = match (self.session.token(), &self.api_key) {
            (Some(token), _) => builder.bearer_auth(token),
            (None, Some(key)) => builder.header(API_KEY_HEADER, key),
            (None, None) => builder,
        };
        Ok(builder)
    }

    fn build(builder: RequestBuilder) -> Result<Request, ApiError> {
        builder.build().map_err(ApiError::from_reqwest)
    }

    fn build_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Request, ApiError> {
        Self::build(self.authorized(method, path)?.json(body))
    }

    pub fn build_list(&self, query: &ListQuery) -> Result<Request, ApiError> {
        Self::build(
            self.authorized(Method::GET, "outreach")?
                .query(&query.query_pairs()),
        )
    }

    pub fn build_list_pending(&self, limit: Option<u32>) -> Result<Request, ApiError> {
        let mut builder = self.authorized(Method::GET, "outreach/pending")?;
        if let Some(limit) = limit {
            builder = builder.query(&[("limit", limit)]);
        }
        Self::build(builder)
    }

    pub fn build_get(&self, id: i64) -> Result<Request, ApiError> {
        Self::build(self.authorized(Method::GET, &format!("outreach/{id}"))?)
    }

    pub fn build_edit(&self, id: i64, edit: &EditOutreach) -> Result<Request, ApiError> {
        self.build_json(Method::PUT, &format!("outreach/{id}/edit"), edit)
    }

    pub fn build_approve(&self, id: i64, approve: &ApproveOutreach) -> Result<Request, ApiError> {
        self.build_json(Method::POST, &format!("outreach/{id}/approve"), approve)
    }

    pub fn build_reject(&self, id: i64, reject: &RejectOutreach) -> Result<Request, ApiError> {
        self.build_json(Method::POST, &format!("outreach/{id}/reject"), reject)
    }

    pub fn build_send(&self, id: i64) -> Result<Request, ApiError> {
        Self::build(self.authorized(Method::POST, &format!("outreach/{id}/send"))?)
    }

    pub fn build_generate_bulk(&self, req: &BulkGenerate) -> Result<Request, ApiError> {
        self.build_json(Method::POST, "outreach/generate/bulk", req)
    }

    pub fn build_generate_for_campaign(
        &self,
        req: &CampaignGenerate,
    ) -> Result<Request, ApiError> {
        self.build_json(Method::POST, "outreach/generate", req)
    }

    pub fn build_generate_single(&self, req: &SingleGenerate) -> Result<Request, ApiError> {
        self.build_json(Method::POST, "outreach/generate/single", req)
    }

    pub fn build_list_campaigns(&self) -> Result<Request, ApiError> {
        Self::build(self.authorized(Method::GET, "campaigns")?)
    }

    pub fn build_get_campaign(&self, id: i64) -> Result<Request, ApiError> {
        Self::build(self.authorized(Method::GET, &format!("campaigns/{id}"))?)
    }

    pub fn build_login(&self, email: &str, password: &str) -> Result<Request, ApiError> {
        self.build_json(Method::POST, "auth/login", &LoginRequest { email, password })
    }

    pub fn build_me(&self) -> Result<Request, ApiError> {
        Self::build(self.authorized(Method::GET, "auth/me")?)
    }

    /// Send `request` and decode a JSON body of type `T`.
    ///
    /// A 401 expires the session before the error is returned.
    #[instrument(skip_all, fields(method = %request.method(), path = %request.url().path()))]
    pub async fn execute<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
        debug!("sending outreach api request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(ApiError::from_reqwest)?;
        let status = res.status();
        let body = res.text().await.map_err(ApiError::from_reqwest)?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("outreach api rejected credentials; expiring session");
            if let Err(err) = self.session.expire().await {
                warn!(?err, "failed to clear stored session");
            }
            return Err(ApiError::from_response(status, &body));
        }
        if !status.is_success() {
            let err = ApiError::from_response(status, &body);
            warn!(%status, error = %err, "outreach api error");
            return Err(err);
        }

        debug!(%status, "outreach api response");
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{e}: {body}")))
    }

    pub async fn get_campaign(&self, id: i64) -> Result<Campaign, ApiError> {
        self.execute(self.build_get_campaign(id)?).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.execute(self.build_login(email, password)?).await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.execute(self.build_me()?).await
    }

    /// Raw JSON of a single item, for inspection tools.
    pub async fn get_outreach_raw(&self, id: i64) -> Result<serde_json::Value, ApiError> {
        self.execute(self.build_get(id)?).await
    }
}

#[async_trait]
impl OutreachService for OutreachClient {
    async fn list_outreach(&self, query: &ListQuery) -> Result<Vec<OutreachItem>, ApiError> {
        self.execute(self.build_list(query)?).await
    }

    async fn list_pending(&self, limit: Option<u32>) -> Result<Vec<OutreachItem>, ApiError> {
        self.execute(self.build_list_pending(limit)?).await
    }

    async fn get_outreach(&self, id: i64) -> Result<OutreachItem, ApiError> {
        self.execute(self.build_get(id)?).await
    }

    async fn edit_outreach(&self, id: i64, edit: &EditOutreach) -> Result<OutreachItem, ApiError> {
        self.execute(self.build_edit(id, edit)?).await
    }

    async fn approve_outreach(
        &self,
        id: i64,
        approve: &ApproveOutreach,
    ) -> Result<OutreachItem, ApiError> {
        self.execute(self.build_approve(id, approve)?).await
    }

    async fn reject_outreach(
        &self,
        id: i64,
        reject: &RejectOutreach,
    ) -> Result<OutreachItem, ApiError> {
        self.execute(self.build_reject(id, reject)?).await
    }

    async fn send_outreach(&self, id: i64) -> Result<OutreachItem, ApiError> {
        self.execute(self.build_send(id)?).await
    }

    async fn generate_bulk(&self, req: &BulkGenerate) -> Result<GenerateCounts, ApiError> {
        self.execute(self.build_generate_bulk(req)?).await
    }

    async fn generate_for_campaign(
        &self,
        req: &CampaignGenerate,
    ) -> Result<GenerateCounts, ApiError> {
        self.execute(self.build_generate_for_campaign(req)?).await
    }

    async fn generate_single(&self, req: &SingleGenerate) -> Result<GenerateCounts, ApiError> {
        self.execute(self.build_generate_single(req)?).await
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>, ApiError> {
        self.execute(self.build_list_campaigns()?).await
    }
}

// Without the slash `Url::join` would drop the last path segment.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
