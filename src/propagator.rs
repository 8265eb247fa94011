use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::db::prelude::*;
use crate::triggers::{ChangeEvent, ChangeKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Propagation {
    /// Display attributes did not change, so nothing was written.
    pub skipped: bool,
    pub entries_patched: usize,
    pub winners_patched: usize,
}

/// Pushes profile display changes onto leaderboard entries and, when the user holds it, the
/// announced winner slot. Scores are never written here.
pub struct ProfilePropagator {
    stores: Stores,
}

impl ProfilePropagator {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    #[instrument(skip(self, change), fields(user_id = %change.user_id, kind = ?change.change_kind))]
    pub async fn propagate(
        &self,
        change: &ChangeEvent<ProfileRecord>,
        now: DateTime<Utc>,
    ) -> StoreResult<Propagation> {
        let after = match (change.change_kind, change.after_data.as_ref()) {
            (ChangeKind::Deleted, _) => Profile::default(),
            (_, Some(after)) => Profile::resolve(Some(after)),
            // no after image attached, the stored document is authoritative
            (_, None) => {
                let record = self.stores.profiles.profile(&change.user_id).await?;
                Profile::resolve(record.as_ref())
            }
        };

        if let Some(before) = change.before_data.as_ref() {
            if Profile::resolve(Some(before)) == after {
                tracing::debug!("display attributes unchanged, skipping");
                return Ok(Propagation {
                    skipped: true,
                    ..Default::default()
                });
            }
        }

        let mut propagation = Propagation::default();
        for period in Period::ALL {
            if self
                .stores
                .leaderboards
                .patch_display(period, &change.user_id, &after, now)
                .await?
            {
                propagation.entries_patched += 1;
            }

            if self
                .stores
                .winners
                .patch_display_if_winner(period, &change.user_id, &after)
                .await?
            {
                propagation.winners_patched += 1;
            }
        }

        tracing::info!(
            entries_patched = propagation.entries_patched,
            winners_patched = propagation.winners_patched,
            "profile propagated"
        );

        Ok(propagation)
    }
}
