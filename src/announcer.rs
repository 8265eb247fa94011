use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::db::prelude::*;
use crate::rollup::window::Calendar;

/// The highest-scoring entry. Ties keep whichever entry the store returned first.
pub fn select_winner(entries: &[RollupEntry]) -> Option<&RollupEntry> {
    entries.iter().fold(None, |best, entry| match best {
        Some(best) if best.score >= entry.score => Some(best),
        _ => Some(entry),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    Announced(AnnouncedWinner),
    /// This window already has a winner and the call was not forced.
    AlreadyAnnounced(AnnouncedWinner),
    /// No materialized entry belongs to the current window.
    NoEntries,
}

/// Copies the top materialized entry of a period into the winner slot. Never recomputes
/// aggregates; it trusts whatever the last rollup left behind.
pub struct WinnerAnnouncer {
    stores: Stores,
    calendar: Calendar,
}

impl WinnerAnnouncer {
    pub fn new(stores: Stores, calendar: Calendar) -> Self {
        Self { stores, calendar }
    }

    #[instrument(skip(self))]
    pub async fn announce(
        &self,
        period: Period,
        now: DateTime<Utc>,
        force: bool,
    ) -> StoreResult<Announcement> {
        let window = self.calendar.window(period, now);

        if !force {
            if let Some(existing) = self.stores.winners.winner(period).await? {
                if existing.window_start == window.start {
                    tracing::info!(%period, user_id = %existing.user_id, "winner already announced for window");
                    return Ok(Announcement::AlreadyAnnounced(existing));
                }
            }
        }

        let entries: Vec<_> = self
            .stores
            .leaderboards
            .entries(period)
            .await?
            .into_iter()
            .filter(|entry| entry.window_start == window.start)
            .collect();

        let Some(top) = select_winner(&entries) else {
            tracing::info!(%period, window_start = %window.start, "no entries to announce");
            return Ok(Announcement::NoEntries);
        };

        let record = self.stores.profiles.profile(&top.user_id).await?;
        let winner = AnnouncedWinner::from_entry(top, Profile::resolve(record.as_ref()), now);
        self.stores.winners.announce(&winner).await?;

        tracing::info!(
            %period,
            user_id = %winner.user_id,
            score = winner.score,
            candidates = entries.len(),
            "winner announced"
        );

        Ok(Announcement::Announced(winner))
    }
}
