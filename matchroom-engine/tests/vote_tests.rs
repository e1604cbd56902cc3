//! Integration tests for the vote transaction engine.

mod common;

use sqlx::Row;

use matchroom_common::db::{RoomStatus, VoteType};
use matchroom_engine::db::rooms;
use matchroom_engine::error::EngineError;
use matchroom_engine::services::vote_engine::VoteEngine;

use common::setup_db;

const VOTE_TTL: i64 = 24 * 60 * 60;

#[tokio::test]
async fn capacity_three_room_matches_on_third_yes() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool.clone(), VOTE_TTL);
    let room = rooms::create_room(&pool, 3).await.expect("create room");

    let first = engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::Yes)
        .await
        .expect("first vote");
    assert!(!first.match_found);
    assert_eq!(first.yes_vote_count, 1);

    let second = engine
        .process_vote(&room.room_id, "movie-1", "bob", VoteType::Yes)
        .await
        .expect("second vote");
    assert!(!second.match_found);
    assert_eq!(second.yes_vote_count, 2);

    let third = engine
        .process_vote(&room.room_id, "movie-1", "carol", VoteType::Yes)
        .await
        .expect("third vote");
    assert!(third.match_found);
    assert_eq!(third.yes_vote_count, 3);

    // The engine signals consensus but leaves the phase decision to the
    // room owner
    let room = rooms::room_by_id(&pool, &room.room_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(room.status, RoomStatus::VotingInProgress);
}

#[tokio::test]
async fn no_votes_never_contribute_to_consensus() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool.clone(), VOTE_TTL);
    let room = rooms::create_room(&pool, 2).await.expect("create room");

    let outcome = engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::No)
        .await
        .expect("no vote");
    assert!(!outcome.match_found);
    assert_eq!(outcome.yes_vote_count, 0);

    // A NO plus a YES on a capacity-2 room is not consensus
    let outcome = engine
        .process_vote(&room.room_id, "movie-1", "bob", VoteType::Yes)
        .await
        .expect("yes vote");
    assert!(!outcome.match_found);
    assert_eq!(outcome.yes_vote_count, 1);
}

#[tokio::test]
async fn revoting_cannot_inflate_the_yes_count() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool.clone(), VOTE_TTL);
    let room = rooms::create_room(&pool, 3).await.expect("create room");

    engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::Yes)
        .await
        .expect("yes");
    let repeat = engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::Yes)
        .await
        .expect("repeated yes");
    assert_eq!(repeat.yes_vote_count, 1);

    let flipped = engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::No)
        .await
        .expect("flip to no");
    assert_eq!(flipped.yes_vote_count, 0);

    let back = engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::Yes)
        .await
        .expect("flip back to yes");
    assert_eq!(back.yes_vote_count, 1);

    // Last writer wins: the stored vote row reflects the final flip
    let recorded = engine
        .vote_for(&room.room_id, "movie-1", "alice")
        .await
        .unwrap()
        .expect("vote row exists");
    assert_eq!(recorded.vote_type, VoteType::Yes);
    assert_eq!(recorded.user_id, "alice");
}

#[tokio::test]
async fn matched_room_rejects_votes_with_nothing_written() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool.clone(), VOTE_TTL);
    let room = rooms::create_room(&pool, 2).await.expect("create room");

    rooms::set_room_status(&pool, &room.room_id, RoomStatus::Matched)
        .await
        .expect("set matched");

    let err = engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::Yes)
        .await
        .expect_err("matched room must reject");
    assert!(matches!(err, EngineError::RoomNotAvailable(_)));

    // The whole transaction rolled back: no vote row, no count row
    assert!(engine
        .vote_for(&room.room_id, "movie-1", "alice")
        .await
        .unwrap()
        .is_none());
    let votes: i64 = sqlx::query("SELECT COUNT(*) AS n FROM votes WHERE room_id = ?")
        .bind(&room.room_id)
        .fetch_one(&pool)
        .await
        .unwrap()
        .try_get("n")
        .unwrap();
    assert_eq!(votes, 0);
    assert_eq!(
        engine.yes_vote_count(&room.room_id, "movie-1").await.unwrap(),
        0
    );

    // The room status is untouched
    let room = rooms::room_by_id(&pool, &room.room_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(room.status, RoomStatus::Matched);
}

#[tokio::test]
async fn unknown_room_is_not_available() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool, VOTE_TTL);

    let err = engine
        .process_vote("no-such-room", "movie-1", "alice", VoteType::Yes)
        .await
        .expect_err("missing room must reject");
    assert!(matches!(err, EngineError::RoomNotAvailable(_)));
}

#[tokio::test]
async fn votes_are_scoped_per_movie() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool.clone(), VOTE_TTL);
    let room = rooms::create_room(&pool, 2).await.expect("create room");

    engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::Yes)
        .await
        .expect("yes on movie-1");
    engine
        .process_vote(&room.room_id, "movie-2", "bob", VoteType::Yes)
        .await
        .expect("yes on movie-2");

    assert_eq!(
        engine.yes_vote_count(&room.room_id, "movie-1").await.unwrap(),
        1
    );
    assert_eq!(
        engine.yes_vote_count(&room.room_id, "movie-2").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn first_vote_moves_room_into_voting() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool.clone(), VOTE_TTL);
    let room = rooms::create_room(&pool, 2).await.expect("create room");
    assert_eq!(room.status, RoomStatus::WaitingForMembers);

    engine
        .process_vote(&room.room_id, "movie-1", "alice", VoteType::Yes)
        .await
        .expect("vote");

    let room = rooms::room_by_id(&pool, &room.room_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(room.status, RoomStatus::VotingInProgress);
}

#[tokio::test]
async fn blank_identifiers_are_rejected_before_any_write() {
    let (pool, _dir) = setup_db().await;
    let engine = VoteEngine::new(pool.clone(), VOTE_TTL);
    let room = rooms::create_room(&pool, 2).await.expect("create room");

    let err = engine
        .process_vote(&room.room_id, "movie-1", "  ", VoteType::Yes)
        .await
        .expect_err("blank user must reject");
    assert!(matches!(err, EngineError::Validation(_)));
}
