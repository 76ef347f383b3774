//! Change delta resolution.
//!
//! Combines what the builder finds in storage since the last build with what
//! the pending notifications point at.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::builder::IndexBuilder;
use crate::errors::PipelineError;
use search_indexer_repository::{NotificationStore, SearchEngineClient};
use search_indexer_shared::{AffectedEntityType, IndexNotification, StoredNotification, Uid, UpdateType};

/// Uids to re-index and to remove in one build iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDelta {
    pub added_or_modified: HashSet<Uid>,
    pub deleted: HashSet<Uid>,
    /// Highest notification id folded into this delta.
    pub resolved_through: Option<u64>,
}

impl ChangeDelta {
    pub fn is_empty(&self) -> bool {
        self.added_or_modified.is_empty() && self.deleted.is_empty()
    }
}

/// Resolves [`ChangeDelta`]s for one index type at a time.
pub struct ChangeDeltaResolver {
    engine: Arc<dyn SearchEngineClient>,
    notifications: Arc<dyn NotificationStore>,
}

impl ChangeDeltaResolver {
    pub fn new(engine: Arc<dyn SearchEngineClient>, notifications: Arc<dyn NotificationStore>) -> Self {
        Self {
            engine,
            notifications,
        }
    }

    /// Storage delta since `since`, plus every pending notification with an
    /// id above `after`.
    pub async fn resolve(
        &self,
        builder: &dyn IndexBuilder,
        since: DateTime<Utc>,
        after: Option<u64>,
    ) -> Result<ChangeDelta, PipelineError> {
        let mut delta = ChangeDelta::default();
        delta
            .added_or_modified
            .extend(builder.find_added_or_modified_uids(since).await?);
        delta.deleted.extend(builder.find_deleted_uids(since).await?);

        debug!(
            index_type = %builder.index_type(),
            added_or_modified = delta.added_or_modified.len(),
            deleted = delta.deleted.len(),
            "Resolved storage delta"
        );

        self.fold_notifications(builder, after, &mut delta).await?;
        Ok(delta)
    }

    /// Like [`Self::resolve`] without querying the builder's storage delta.
    pub async fn resolve_notifications_only(
        &self,
        builder: &dyn IndexBuilder,
        after: Option<u64>,
    ) -> Result<ChangeDelta, PipelineError> {
        let mut delta = ChangeDelta::default();
        self.fold_notifications(builder, after, &mut delta).await?;
        Ok(delta)
    }

    async fn fold_notifications(
        &self,
        builder: &dyn IndexBuilder,
        after: Option<u64>,
        delta: &mut ChangeDelta,
    ) -> Result<(), PipelineError> {
        let index_type = builder.index_type();
        let pending: Vec<StoredNotification> = self
            .notifications
            .find_new_notifications(index_type)
            .await?
            .into_iter()
            .filter(|stored| after.map_or(true, |after| stored.id > after))
            .collect();

        for stored in &pending {
            // a rebuild request closes the window; it is left for the next build
            let target = match stored.notification.update_type {
                UpdateType::Update => &mut delta.added_or_modified,
                UpdateType::Delete => &mut delta.deleted,
                UpdateType::Rebuild => break,
            };
            delta.resolved_through = delta.resolved_through.max(Some(stored.id));

            match self.affected_uids(builder, &stored.notification).await? {
                Some(uids) => target.extend(uids),
                None => warn!(
                    index_type = %index_type,
                    notification_id = stored.id,
                    "Skipping malformed notification"
                ),
            }
        }

        debug!(
            index_type = %index_type,
            notifications = pending.len(),
            resolved_through = ?delta.resolved_through,
            "Folded notifications into delta"
        );
        Ok(())
    }

    /// `None` when the notification lacks what its entity type needs.
    async fn affected_uids(
        &self,
        builder: &dyn IndexBuilder,
        notification: &IndexNotification,
    ) -> Result<Option<Vec<Uid>>, PipelineError> {
        match notification.affected_entity_type {
            None => match notification.query_string.as_deref() {
                Some(query) if !query.trim().is_empty() => {
                    Ok(Some(self.engine.find_uids(notification.index_type, query).await?))
                }
                _ => Ok(None),
            },
            Some(AffectedEntityType::SingleUnit) => Ok(notification.affected_uid.map(|uid| vec![uid])),
            Some(_) => {
                if notification.affected_uid.is_none() {
                    return Ok(None);
                }
                Ok(Some(builder.find_uids_by_notification(notification).await?))
            }
        }
    }
}
