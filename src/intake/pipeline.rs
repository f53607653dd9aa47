// Per-beacon intake: parse, validate, rate-check, score and append to the checkin log.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::db::Database;
use crate::intake::beacon::{Beacon, BeaconError, BeaconKind};
use crate::metrics;
use crate::rate_limit::BeaconInterval;
use crate::scoring::ScoringPolicy;

/// Why a beacon produced no checkin. Agents never learn which one applied.
#[derive(Debug, Error)]
pub enum DropReason {
    #[error("empty payload")]
    Empty,
    #[error("malformed payload: {0}")]
    Malformed(BeaconError),
    #[error("unknown agent {0}")]
    UnknownAgent(Uuid),
    #[error("source {0} is not IPv4")]
    NotIpv4(IpAddr),
    #[error("source {0} is not in scope")]
    OutOfScope(Ipv4Addr),
    #[error("beacon {gap_secs}s after previous checkin")]
    TooSoon { gap_secs: i64 },
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl DropReason {
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::Empty => "empty",
            DropReason::Malformed(_) => "malformed",
            DropReason::UnknownAgent(_) => "unknown_agent",
            DropReason::NotIpv4(_) => "not_ipv4",
            DropReason::OutOfScope(_) => "out_of_scope",
            DropReason::TooSoon { .. } => "too_soon",
            DropReason::Store(_) => "store",
        }
    }
}

impl From<BeaconError> for DropReason {
    fn from(e: BeaconError) -> Self {
        match e {
            BeaconError::Empty => DropReason::Empty,
            other => DropReason::Malformed(other),
        }
    }
}

/// A beacon that was appended to the checkin log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCheckin {
    pub checkin_id: i64,
    pub agent: Uuid,
    pub team_id: i64,
    pub target: Ipv4Addr,
    /// Points this beacon was worth at intake. Informational only; the
    /// scoreboard recomputes from the log.
    pub points: i64,
    /// Seconds since the agent's previous checkin; `None` for first blood.
    pub gap_secs: Option<i64>,
    pub time_unix: i64,
}

#[derive(Debug)]
pub enum IntakeOutcome {
    SelfTest { agent: Uuid },
    Persisted(PersistedCheckin),
    Dropped(DropReason),
}

impl IntakeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IntakeOutcome::SelfTest { .. } => "selftest",
            IntakeOutcome::Persisted(_) => "persisted",
            IntakeOutcome::Dropped(reason) => reason.label(),
        }
    }

    /// Log the outcome at the level its class calls for.
    pub fn log(&self, source: IpAddr) {
        match self {
            IntakeOutcome::SelfTest { agent } => {
                tracing::info!(%agent, %source, "Agent self-test beacon");
            }
            IntakeOutcome::Persisted(c) => {
                tracing::info!(
                    agent = %c.agent,
                    team_id = c.team_id,
                    target = %c.target,
                    points = c.points,
                    gap_secs = ?c.gap_secs,
                    "Checkin persisted"
                );
            }
            IntakeOutcome::Dropped(reason) => match reason {
                DropReason::Empty | DropReason::Malformed(_) => {
                    tracing::info!(%source, "Dropped beacon: {reason}");
                }
                DropReason::UnknownAgent(_) | DropReason::NotIpv4(_) | DropReason::OutOfScope(_) => {
                    tracing::warn!(%source, "Dropped beacon: {reason}");
                }
                DropReason::TooSoon { .. } => {
                    tracing::debug!(%source, "Ignored beacon: {reason}");
                }
                DropReason::Store(e) => {
                    tracing::error!(%source, "Failed to record beacon: {e}");
                }
            },
        }
    }
}

/// Stateless apart from the store handle: safe to share across connection tasks.
pub struct IntakePipeline {
    db: Arc<Database>,
    policy: ScoringPolicy,
}

impl IntakePipeline {
    pub fn new(db: Arc<Database>, policy: ScoringPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Run one payload from `source` through the pipeline as of unix time `now`.
    pub async fn process(&self, payload: &[u8], source: IpAddr, now: i64) -> IntakeOutcome {
        let started = Instant::now();

        let outcome = match self.run(payload, source, now).await {
            Ok(outcome) => outcome,
            Err(reason) => IntakeOutcome::Dropped(reason),
        };

        metrics::INTAKE_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        metrics::BEACONS_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        if matches!(outcome, IntakeOutcome::Persisted(_)) {
            metrics::CHECKINS_PERSISTED_TOTAL.inc();
        }
        outcome.log(source);
        outcome
    }

    async fn run(
        &self,
        payload: &[u8],
        source: IpAddr,
        now: i64,
    ) -> Result<IntakeOutcome, DropReason> {
        let beacon = Beacon::parse(payload)?;
        if beacon.kind == BeaconKind::SelfTest {
            return Ok(IntakeOutcome::SelfTest {
                agent: beacon.agent,
            });
        }

        let agent = self
            .db
            .find_agent(&beacon.agent)
            .await?
            .ok_or(DropReason::UnknownAgent(beacon.agent))?;

        let address = source_ipv4(source).ok_or(DropReason::NotIpv4(source))?;
        let target = self
            .db
            .find_target(address)
            .await?
            .ok_or(DropReason::OutOfScope(address))?;

        let last = self.db.last_checkin_time(&beacon.agent).await?;
        let interval = BeaconInterval::classify(last, now, self.policy.min_interval_secs);
        let points = match interval {
            BeaconInterval::First => target.value,
            BeaconInterval::TooSoon { gap_secs } => return Err(DropReason::TooSoon { gap_secs }),
            BeaconInterval::Since { gap_secs } => {
                self.policy.callback_points(gap_secs, target.value)
            }
        };

        let appended = self
            .db
            .append_checkin_guarded(&beacon.agent, address, now, self.policy.min_interval_secs)
            .await?;

        let Some(checkin) = appended else {
            // Another beacon from this agent landed between the read and the append.
            let last = self.db.last_checkin_time(&beacon.agent).await?;
            return Err(DropReason::TooSoon {
                gap_secs: last.map_or(0, |t| now - t),
            });
        };

        Ok(IntakeOutcome::Persisted(PersistedCheckin {
            checkin_id: checkin.checkin_id,
            agent: beacon.agent,
            team_id: agent.team_id,
            target: address,
            points,
            gap_secs: interval.gap_secs(),
            time_unix: checkin.time_unix,
        }))
    }
}

/// IPv4 source address, unwrapping IPv4-mapped IPv6 from dual-stack sockets.
pub fn source_ipv4(source: IpAddr) -> Option<Ipv4Addr> {
    match source {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}
