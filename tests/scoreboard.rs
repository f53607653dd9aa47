// Integration tests for scoreboard reconstruction over the checkin log.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use pwnts_collector::db::Database;
use pwnts_collector::intake::{IntakeOutcome, IntakePipeline};
use pwnts_collector::registry::{register_agent, register_team};
use pwnts_collector::scoreboard::{Scoreboard, TeamScore};
use pwnts_collector::scoring::ScoringPolicy;
use uuid::Uuid;

const T1: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const T2: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

struct Game {
    db: Arc<Database>,
    pipeline: IntakePipeline,
    scoreboard: Scoreboard,
}

impl Game {
    async fn new() -> Self {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.add_target(T1, 100).await.unwrap();
        db.add_target(T2, 40).await.unwrap();
        let policy = ScoringPolicy::default();
        Game {
            pipeline: IntakePipeline::new(db.clone(), policy),
            scoreboard: Scoreboard::new(db.clone(), policy),
            db,
        }
    }

    async fn team_with_agent(&self, name: &str) -> Uuid {
        let team = register_team(&self.db, name, "pw", 0).await.unwrap();
        let agent = Uuid::new_v4();
        register_agent(&self.db, &agent.to_string(), team.team_id, 0)
            .await
            .unwrap();
        agent
    }

    async fn beacon(&self, agent: Uuid, from: Ipv4Addr, at: i64) -> IntakeOutcome {
        self.pipeline
            .process(agent.to_string().as_bytes(), IpAddr::V4(from), at)
            .await
    }

    async fn score(&self, team: &str, now: i64) -> TeamScore {
        self.scoreboard.compute(now).await.unwrap()[team]
    }
}

fn score(pwnts: i64, pwned_hosts: i64) -> TeamScore {
    TeamScore { pwnts, pwned_hosts }
}

#[tokio::test]
async fn test_first_blood_then_decayed_pair() {
    let game = Game::new().await;
    let agent = game.team_with_agent("Red").await;

    game.beacon(agent, T1, 0).await;
    assert_eq!(game.score("Red", 0).await, score(100, 1));

    game.beacon(agent, T1, 300).await;
    // only the two most recent checkins count
    assert_eq!(game.score("Red", 300).await, score(52, 1));
}

#[tokio::test]
async fn test_dead_pair_decays_to_zero() {
    let game = Game::new().await;
    let agent = game.team_with_agent("Red").await;

    game.beacon(agent, T1, 0).await;
    assert_eq!(game.score("Red", 900).await, score(100, 1));
    assert_eq!(game.score("Red", 1_000).await, score(0, 0));
}

#[tokio::test]
async fn test_reconstruction_is_idempotent() {
    let game = Game::new().await;
    let red = game.team_with_agent("Red").await;
    let blue = game.team_with_agent("Blue").await;

    game.beacon(red, T1, 0).await;
    game.beacon(red, T1, 120).await;
    game.beacon(blue, T2, 60).await;

    let first = game.scoreboard.compute(200).await.unwrap();
    let second = game.scoreboard.compute(200).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_teams_without_checkins_listed() {
    let game = Game::new().await;
    let red = game.team_with_agent("Red").await;
    game.team_with_agent("Blue").await;
    register_team(&game.db, "Green", "pw", 0).await.unwrap();

    game.beacon(red, T1, 0).await;

    let standings = game.scoreboard.compute(10).await.unwrap();
    assert_eq!(standings.len(), 3);
    assert_eq!(standings["Blue"], score(0, 0));
    assert_eq!(standings["Green"], score(0, 0));
    assert_eq!(standings["Red"], score(100, 1));
}

#[tokio::test]
async fn test_multiple_targets_sum() {
    let game = Game::new().await;
    let team = register_team(&game.db, "Red", "pw", 0).await.unwrap();
    let on_t1 = Uuid::new_v4();
    let on_t2 = Uuid::new_v4();
    for agent in [on_t1, on_t2] {
        register_agent(&game.db, &agent.to_string(), team.team_id, 0)
            .await
            .unwrap();
    }

    game.beacon(on_t1, T1, 0).await;
    game.beacon(on_t2, T2, 0).await;
    game.beacon(on_t1, T1, 600).await;
    game.beacon(on_t2, T2, 60).await;

    // T1: ten-minute gap on 100 -> 23; T2: one-minute gap on 40 -> 40
    assert_eq!(game.score("Red", 600).await, score(63, 2));
}

#[tokio::test]
async fn test_dead_window_gap_never_raises_score() {
    let game = Game::new().await;
    let agent = game.team_with_agent("Red").await;

    game.beacon(agent, T1, 0).await;
    game.beacon(agent, T1, 60).await;
    let before = game.score("Red", 60).await;
    assert_eq!(before, score(100, 1));

    game.beacon(agent, T1, 60 + 20 * 60).await;
    let after = game.score("Red", 60 + 20 * 60).await;
    assert_eq!(after, score(1, 1));
    assert!(after.pwnts <= before.pwnts);
}

#[tokio::test]
async fn test_agents_of_one_team_share_a_pair() {
    let game = Game::new().await;
    let team = register_team(&game.db, "Red", "pw", 0).await.unwrap();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    for agent in [a, b] {
        register_agent(&game.db, &agent.to_string(), team.team_id, 0)
            .await
            .unwrap();
    }

    game.beacon(a, T1, 0).await;
    game.beacon(b, T1, 300).await;

    // gap measured across agents
    assert_eq!(game.score("Red", 300).await, score(52, 1));
}

#[tokio::test]
async fn test_future_checkins_ignored() {
    let game = Game::new().await;
    let agent = game.team_with_agent("Red").await;

    game.beacon(agent, T1, 0).await;
    game.beacon(agent, T1, 300).await;

    // as of t=100 only the first checkin exists
    assert_eq!(game.score("Red", 100).await, score(100, 1));
}
