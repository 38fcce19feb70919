// Integration tests for round-robin competitions: schedule completeness,
// standings and the final placing.

mod common;

use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};
use festival_brackets::bracket::CompetitionFormat;
use festival_brackets::db::{CompetitionStatus, Match};
use festival_brackets::Engine;

use common::{new_competition, play_out, ranked, test_engine};

fn pair(m: &Match) -> (i64, i64) {
    let (a, b) = (m.entrant_1_id.unwrap(), m.entrant_2_id.unwrap());
    (a.min(b), a.max(b))
}

// ── Schedule ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_every_pair_meets_once() {
    let engine = test_engine().await;
    for n in 2..=12i64 {
        let cid = new_competition(&engine, CompetitionFormat::RoundRobin).await;
        let summary = engine.build_bracket(cid, &ranked(n)).await.unwrap();
        let expected_rounds = (if n % 2 == 0 { n - 1 } else { n }) as u32;
        assert_eq!(summary.rounds_total, expected_rounds, "n = {n}");
        assert_eq!(summary.byes, 0);

        let matches = engine.list_matches(cid).await.unwrap();
        assert_eq!(matches.len() as i64, n * (n - 1) / 2, "n = {n}");
        let pairs: HashSet<(i64, i64)> = matches.iter().map(pair).collect();
        assert_eq!(pairs.len(), matches.len(), "n = {n}: a pair repeats");

        for round in 1..=expected_rounds {
            let mut seen = HashSet::new();
            for m in matches.iter().filter(|m| m.round_number == round) {
                let (a, b) = pair(m);
                assert!(seen.insert(a) && seen.insert(b), "n = {n}, round {round}");
            }
            if n % 2 == 1 {
                assert_eq!(seen.len() as i64, n - 1, "n = {n}: one entrant sits out");
            }
        }
    }
}

// ── Placing ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_most_wins_takes_the_title() {
    let engine = test_engine().await;
    let cid = new_competition(&engine, CompetitionFormat::RoundRobin).await;
    engine.build_bracket(cid, &ranked(4)).await.unwrap();

    // Entrant 3 wins everything, otherwise the lower id wins.
    play_out(&engine, cid, |m| {
        m.slot_of(3).unwrap_or_else(|| common::favourite(m))
    })
    .await;

    let competition = engine.get_competition(cid).await.unwrap();
    assert_eq!(competition.status, CompetitionStatus::Completed);
    assert_eq!(competition.winner_id, Some(3));
    assert_eq!(competition.runner_up_id, Some(1));

    let table = engine.standings(cid).await.unwrap();
    let order: Vec<(i64, u32)> = table.iter().map(|s| (s.entrant_id, s.wins)).collect();
    assert_eq!(order, vec![(3, 3), (1, 2), (2, 1), (4, 0)]);
    assert!(table.iter().all(|s| s.played == 3));
}

#[tokio::test]
async fn test_three_way_tie_falls_back_to_seed() {
    let engine = test_engine().await;
    let cid = new_competition(&engine, CompetitionFormat::RoundRobin).await;
    engine.build_bracket(cid, &ranked(3)).await.unwrap();

    // 1 beats 2, 2 beats 3, 3 beats 1.
    play_out(&engine, cid, |m| match pair(m) {
        (1, 2) => m.slot_of(1).unwrap(),
        (2, 3) => m.slot_of(2).unwrap(),
        _ => m.slot_of(3).unwrap(),
    })
    .await;

    let competition = engine.get_competition(cid).await.unwrap();
    assert_eq!(competition.winner_id, Some(1));
    assert_eq!(competition.runner_up_id, Some(2));
}

async fn vote_times(
    engine: &Engine,
    match_id: i64,
    entrant: i64,
    count: usize,
    at: chrono::DateTime<Utc>,
) {
    for i in 0..count {
        engine
            .submit_vote_at(match_id, entrant, &format!("fan-{entrant}-{i}"), at)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_vote_totals_break_equal_wins() {
    let engine = test_engine().await;
    let cid = new_competition(&engine, CompetitionFormat::RoundRobin).await;
    engine.build_bracket(cid, &ranked(3)).await.unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 6, 20, 19, 0, 0).unwrap();

    // Same cycle as above, decided by votes: 1 beats 2 3-1, 2 beats 3 2-0,
    // 3 beats 1 5-4. Votes received: 1 → 7, 3 → 5, 2 → 3.
    let tallies = [((1, 2), (3, 1)), ((2, 3), (2, 0)), ((1, 3), (4, 5))];
    for m in engine.list_matches(cid).await.unwrap() {
        let (a, b) = pair(&m);
        let (_, (votes_a, votes_b)) = tallies.iter().find(|(p, _)| *p == (a, b)).unwrap();
        engine.open_voting_at(m.id, Duration::minutes(10), t0).await.unwrap();
        vote_times(&engine, m.id, a, *votes_a, t0 + Duration::minutes(1)).await;
        vote_times(&engine, m.id, b, *votes_b, t0 + Duration::minutes(1)).await;
        engine
            .complete_at(m.id, None, t0 + Duration::minutes(2))
            .await
            .unwrap();
    }

    let competition = engine.get_competition(cid).await.unwrap();
    assert_eq!(competition.status, CompetitionStatus::Completed);
    assert_eq!(competition.winner_id, Some(1));
    assert_eq!(competition.runner_up_id, Some(3));

    let table = engine.standings(cid).await.unwrap();
    let votes: Vec<(i64, i64)> = table.iter().map(|s| (s.entrant_id, s.votes_for)).collect();
    assert_eq!(votes, vec![(1, 7), (3, 5), (2, 3)]);
}

#[tokio::test]
async fn test_current_round_only_moves_forward() {
    let engine = test_engine().await;
    let cid = new_competition(&engine, CompetitionFormat::RoundRobin).await;
    engine.build_bracket(cid, &ranked(4)).await.unwrap();
    let matches = engine.list_matches(cid).await.unwrap();

    let late = matches.iter().find(|m| m.round_number == 3).unwrap();
    engine.open_voting(late.id, Duration::minutes(30)).await.unwrap();
    assert_eq!(engine.get_competition(cid).await.unwrap().current_round, 3);

    let early = matches.iter().find(|m| m.round_number == 1).unwrap();
    engine
        .complete(early.id, early.entrant_1_id)
        .await
        .unwrap();
    assert_eq!(engine.get_competition(cid).await.unwrap().current_round, 3);
}
