// Scoreboard reconstruction: replay the checkin log into per-team standings.
//
// Nothing here is cached or stored. Every read recomputes from the two most
// recent checkins of each (team, target) pair.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::db::{Database, RecentCheckin, Team};
use crate::metrics;
use crate::scoring::ScoringPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeamScore {
    pub pwnts: i64,
    pub pwned_hosts: i64,
}

/// Team name to standing, ordered by name.
pub type Standings = BTreeMap<String, TeamScore>;

/// Points and host count contributed by one (team, target) pair.
/// `recent` holds the pair's checkins, most recent first.
pub fn pair_contribution(
    recent: &[&RecentCheckin],
    now: i64,
    policy: &ScoringPolicy,
) -> TeamScore {
    let Some(latest) = recent.first() else {
        return TeamScore::default();
    };
    if policy.is_dead(now - latest.time_unix) {
        return TeamScore::default();
    }

    let pwnts = match recent.get(1) {
        None => latest.value,
        Some(second) => policy.callback_points(latest.time_unix - second.time_unix, latest.value),
    };
    TeamScore {
        pwnts,
        pwned_hosts: 1,
    }
}

/// Fold recent checkins into standings. Every team is listed, scoring or not.
pub fn tally(
    teams: &[Team],
    recent: &[RecentCheckin],
    now: i64,
    policy: &ScoringPolicy,
) -> Standings {
    let mut pairs: BTreeMap<(i64, &str), Vec<&RecentCheckin>> = BTreeMap::new();
    for row in recent {
        pairs
            .entry((row.team_id, row.target_ipv4_address.as_str()))
            .or_default()
            .push(row);
    }

    let mut by_team: HashMap<i64, TeamScore> = HashMap::new();
    for ((team_id, _), mut rows) in pairs {
        rows.sort_by_key(|r| r.callback_order);
        let contribution = pair_contribution(&rows, now, policy);
        let score = by_team.entry(team_id).or_default();
        score.pwnts += contribution.pwnts;
        score.pwned_hosts += contribution.pwned_hosts;
    }

    teams
        .iter()
        .map(|team| {
            let score = by_team.get(&team.team_id).copied().unwrap_or_default();
            (team.name.clone(), score)
        })
        .collect()
}

pub struct Scoreboard {
    db: Arc<Database>,
    policy: ScoringPolicy,
}

impl Scoreboard {
    pub fn new(db: Arc<Database>, policy: ScoringPolicy) -> Self {
        Self { db, policy }
    }

    /// Standings as of unix time `now`. Checkins stamped after `now` are ignored.
    pub async fn compute(&self, now: i64) -> Result<Standings, sqlx::Error> {
        let started = Instant::now();

        let teams = self.db.list_teams().await?;
        let recent = self.db.recent_checkins(now).await?;
        let standings = tally(&teams, &recent, now, &self.policy);

        metrics::SCOREBOARD_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        Ok(standings)
    }
}
