//! The review desk: role-gated outreach actions with result notifications.
//!
//! Every mutation waits for the remote store, reports the outcome as a toast,
//! and on success invalidates all cached outreach reads. Nothing local is
//! written from a mutation response.
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::{ApiError, OutreachService};
use crate::cache::{CacheEntry, CacheKey, ListCache};
use crate::config::ActorConfig;
use crate::model::{
    ActorRole, ApproveOutreach, BulkGenerate, Campaign, CampaignGenerate, EditOutreach,
    GenerateCounts, ListQuery, OutreachItem, OutreachStatus, RejectOutreach, SingleGenerate,
    StatusFilter, User,
};
use crate::notify::{Notifier, Toast};
use crate::workflow::{can_act, Controls, OutreachAction};

const UNKNOWN_ACTOR: &str = "unknown";

/// Who is operating the desk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    /// A logged-in user wins; otherwise the configured identity, read-only
    /// when no role is configured.
    pub fn resolve(user: Option<&User>, cfg: &ActorConfig) -> Self {
        match user {
            Some(user) => Self::new(user.display_name(), user.role),
            None => Self::new(
                cfg.name.as_deref().unwrap_or(UNKNOWN_ACTOR),
                cfg.role.unwrap_or(ActorRole::Viewer),
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("the {role} role cannot {action} outreach")]
    NotPermitted {
        role: ActorRole,
        action: OutreachAction,
    },
    #[error("cannot {action} outreach #{id} while it is {status}")]
    Unavailable {
        id: i64,
        status: OutreachStatus,
        action: OutreachAction,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("unexpected cache entry for {0}")]
    Cache(&'static str),
}

pub struct OutreachDesk {
    service: Arc<dyn OutreachService>,
    notifier: Arc<dyn Notifier>,
    cache: ListCache,
    actor: Actor,
}

impl OutreachDesk {
    pub fn new(
        service: Arc<dyn OutreachService>,
        notifier: Arc<dyn Notifier>,
        actor: Actor,
    ) -> Self {
        Self {
            service,
            notifier,
            cache: ListCache::new(),
            actor,
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn cache(&self) -> &ListCache {
        &self.cache
    }

    pub fn controls(&self, item: &OutreachItem) -> Controls {
        Controls::for_item(self.actor.role, item)
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<OutreachItem>, DeskError> {
        let service = &self.service;
        let entry = self
            .cache
            .get_or_fetch(CacheKey::Outreach(query.clone()), || async {
                service.list_outreach(query).await.map(CacheEntry::Items)
            })
            .await?;
        match entry {
            CacheEntry::Items(items) => Ok(items),
            _ => Err(DeskError::Cache("outreach list")),
        }
    }

    pub async fn list_tab(
        &self,
        tab: StatusFilter,
        limit: Option<u32>,
    ) -> Result<Vec<OutreachItem>, DeskError> {
        let mut query = tab.query();
        query.limit = limit;
        self.list(&query).await
    }

    pub async fn list_pending(&self, limit: Option<u32>) -> Result<Vec<OutreachItem>, DeskError> {
        let service = &self.service;
        let entry = self
            .cache
            .get_or_fetch(CacheKey::Pending(limit), || async {
                service.list_pending(limit).await.map(CacheEntry::Items)
            })
            .await?;
        match entry {
            CacheEntry::Items(items) => Ok(items),
            _ => Err(DeskError::Cache("pending list")),
        }
    }

    pub async fn get(&self, id: i64) -> Result<OutreachItem, DeskError> {
        let service = &self.service;
        let entry = self
            .cache
            .get_or_fetch(CacheKey::Item(id), || async {
                service.get_outreach(id).await.map(CacheEntry::Item)
            })
            .await?;
        match entry {
            CacheEntry::Item(item) => Ok(item),
            _ => Err(DeskError::Cache("outreach item")),
        }
    }

    pub async fn campaigns(&self) -> Result<Vec<Campaign>, DeskError> {
        let service = &self.service;
        let entry = self
            .cache
            .get_or_fetch(CacheKey::Campaigns, || async {
                service.list_campaigns().await.map(CacheEntry::Campaigns)
            })
            .await?;
        match entry {
            CacheEntry::Campaigns(campaigns) => Ok(campaigns),
            _ => Err(DeskError::Cache("campaigns")),
        }
    }

    #[instrument(skip(self, edit), fields(actor = %self.actor.name))]
    pub async fn edit(&self, id: i64, edit: &EditOutreach) -> Result<OutreachItem, DeskError> {
        self.gate(OutreachAction::Edit)?;
        self.mutate(
            "Failed to update outreach",
            self.service.edit_outreach(id, edit),
            |item: &OutreachItem| format!("Outreach #{} updated", item.id),
        )
        .await
    }

    /// `approved_by` defaults to the acting user's name.
    #[instrument(skip(self), fields(actor = %self.actor.name))]
    pub async fn approve(
        &self,
        id: i64,
        approved_by: Option<&str>,
    ) -> Result<OutreachItem, DeskError> {
        self.gate(OutreachAction::Approve)?;
        let approve = ApproveOutreach {
            approved_by: approved_by
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .unwrap_or(self.actor.name.as_str())
                .to_string(),
        };
        self.mutate(
            "Failed to approve outreach",
            self.service.approve_outreach(id, &approve),
            |item: &OutreachItem| format!("Outreach #{} approved", item.id),
        )
        .await
    }

    #[instrument(skip(self), fields(actor = %self.actor.name))]
    pub async fn reject(&self, id: i64, reason: Option<&str>) -> Result<OutreachItem, DeskError> {
        self.gate(OutreachAction::Reject)?;
        let reject = RejectOutreach::new(reason);
        self.mutate(
            "Failed to reject outreach",
            self.service.reject_outreach(id, &reject),
            |item: &OutreachItem| format!("Outreach #{} rejected", item.id),
        )
        .await
    }

    /// The server enforces prior approval and the daily send limit; a
    /// rate-limit error is reported with the server's wording.
    #[instrument(skip(self), fields(actor = %self.actor.name))]
    pub async fn send(&self, id: i64) -> Result<OutreachItem, DeskError> {
        self.gate(OutreachAction::Send)?;
        self.mutate(
            "Failed to send outreach",
            self.service.send_outreach(id),
            |item: &OutreachItem| format!("Outreach #{} sent", item.id),
        )
        .await
    }

    /// Send only when the send control is offered for the item's current
    /// status; otherwise no request is issued.
    #[instrument(skip(self), fields(actor = %self.actor.name))]
    pub async fn send_if_available(&self, id: i64) -> Result<OutreachItem, DeskError> {
        self.gate(OutreachAction::Send)?;
        let current = self.get(id).await?;
        if !self.controls(&current).send {
            let err = DeskError::Unavailable {
                id,
                status: current.status,
                action: OutreachAction::Send,
            };
            warn!(id, status = %current.status, "send not available");
            self.notifier.notify(Toast::error(err.to_string()));
            return Err(err);
        }
        self.send(id).await
    }

    /// Generate drafts under the default campaign.
    #[instrument(skip(self))]
    pub async fn generate_bulk(&self, limit: i64) -> Result<GenerateCounts, DeskError> {
        self.gate(OutreachAction::Generate)?;
        let req = BulkGenerate::new(limit);
        self.mutate(
            "Failed to generate outreach",
            self.service.generate_bulk(&req),
            describe_counts,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn generate_for_campaign(
        &self,
        campaign_id: i64,
        limit: i64,
    ) -> Result<GenerateCounts, DeskError> {
        self.gate(OutreachAction::Generate)?;
        let req = CampaignGenerate::new(campaign_id, limit);
        self.mutate(
            "Failed to generate outreach for campaign",
            self.service.generate_for_campaign(&req),
            describe_counts,
        )
        .await
    }

    #[instrument(skip(self, req))]
    pub async fn generate_single(&self, req: &SingleGenerate) -> Result<GenerateCounts, DeskError> {
        self.gate(OutreachAction::Generate)?;
        self.mutate(
            "Failed to generate outreach",
            self.service.generate_single(req),
            describe_counts,
        )
        .await
    }

    fn gate(&self, action: OutreachAction) -> Result<(), DeskError> {
        if can_act(self.actor.role) {
            return Ok(());
        }
        let err = DeskError::NotPermitted {
            role: self.actor.role,
            action,
        };
        self.notifier.notify(Toast::error(err.to_string()));
        Err(err)
    }

    async fn mutate<T, Fut>(
        &self,
        fallback: &str,
        call: Fut,
        describe: impl FnOnce(&T) -> String,
    ) -> Result<T, DeskError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match call.await {
            Ok(value) => {
                self.cache.invalidate_outreach().await;
                let message = describe(&value);
                info!(%message, "outreach mutation succeeded");
                self.notifier.notify(Toast::success(message));
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, status = ?err.status(), "outreach mutation failed");
                self.notifier.notify(Toast::error(err.user_message(fallback)));
                Err(err.into())
            }
        }
    }
}

fn describe_counts(counts: &GenerateCounts) -> String {
    format!(
        "Generated {} drafts ({} skipped, {} errors)",
        counts.generated, counts.skipped, counts.errors
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_prefers_logged_in_user() {
        let user = User {
            id: 1,
            email: "ada@example.com".into(),
            name: None,
            role: ActorRole::Admin,
        };
        let cfg = ActorConfig {
            name: Some("Ops Reviewer".into()),
            role: Some(ActorRole::Reviewer),
        };
        assert_eq!(
            Actor::resolve(Some(&user), &cfg),
            Actor::new("ada@example.com", ActorRole::Admin)
        );
        assert_eq!(
            Actor::resolve(None, &cfg),
            Actor::new("Ops Reviewer", ActorRole::Reviewer)
        );
        assert_eq!(
            Actor::resolve(None, &ActorConfig::default()),
            Actor::new("unknown", ActorRole::Viewer)
        );
    }

    #[test]
    fn counts_message() {
        let counts = GenerateCounts {
            generated: 12,
            skipped: 3,
            errors: 1,
        };
        assert_eq!(
            describe_counts(&counts),
            "Generated 12 drafts (3 skipped, 1 errors)"
        );
    }
}
