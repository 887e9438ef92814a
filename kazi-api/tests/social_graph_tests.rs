//! Social graph scenarios: follows, connections and blocks.

use kazi_api::resources::{BlockedBy, SocialGraph};
use kazi_api::ErrorCode;
use kazi_core::ConnectionStatus;
use kazi_test_utils::{fixtures, generators};
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn graph() -> (std::sync::Arc<kazi_test_utils::InMemoryDatastore>, SocialGraph) {
    let store = fixtures::memory_store();
    (store.clone(), SocialGraph::new(store))
}

#[tokio::test]
async fn test_block_removes_follows_and_connections_both_ways() -> Result<(), String> {
    let (store, social) = graph();
    let (alice, bob) = fixtures::owner_pair();

    social.follow(alice, bob).await.map_err(|e| e.to_string())?;
    social.follow(bob, alice).await.map_err(|e| e.to_string())?;
    social.connect(bob, alice).await.map_err(|e| e.to_string())?;
    let accepted = social
        .respond_to_connection(alice, bob, true)
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(accepted.status, ConnectionStatus::Accepted);

    let block = social
        .block_user(alice, bob, Some("spam".to_string()))
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(block.blocker_id, alice);
    assert_eq!(block.blocked_id, bob);

    assert_eq!(store.row_count("user_follows").await, 0);
    assert_eq!(store.row_count("user_connections").await, 0);
    assert_eq!(store.row_count("user_blocks").await, 1);

    let from_alice = social.is_blocked(alice, bob).await.map_err(|e| e.to_string())?;
    assert!(from_alice.blocked);
    assert_eq!(from_alice.blocked_by, Some(BlockedBy::Me));
    let from_bob = social.is_blocked(bob, alice).await.map_err(|e| e.to_string())?;
    assert_eq!(from_bob.blocked_by, Some(BlockedBy::Them));
    Ok(())
}

#[tokio::test]
async fn test_blocked_pair_cannot_follow_or_connect() -> Result<(), String> {
    let (_, social) = graph();
    let (alice, bob) = fixtures::owner_pair();
    social
        .block_user(alice, bob, None)
        .await
        .map_err(|e| e.to_string())?;

    for result in [
        social.follow(bob, alice).await.err(),
        social.follow(alice, bob).await.err(),
    ] {
        assert_eq!(result.map(|e| e.code), Some(ErrorCode::Forbidden));
    }
    let err = social.connect(bob, alice).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::Forbidden));

    assert!(social.unblock_user(alice, bob).await.map_err(|e| e.to_string())?);
    assert!(!social.unblock_user(alice, bob).await.map_err(|e| e.to_string())?);
    social.follow(bob, alice).await.map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::test]
async fn test_blocking_twice_keeps_one_row() -> Result<(), String> {
    let (store, social) = graph();
    let (alice, bob) = fixtures::owner_pair();
    social
        .block_user(alice, bob, Some("first".to_string()))
        .await
        .map_err(|e| e.to_string())?;
    let again = social
        .block_user(alice, bob, Some("second".to_string()))
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(again.reason.as_deref(), Some("second"));
    assert_eq!(store.row_count("user_blocks").await, 1);

    let listed = social.list_blocked(alice).await.map_err(|e| e.to_string())?;
    assert_eq!(listed.len(), 1);
    assert!(social
        .list_blocked(bob)
        .await
        .map_err(|e| e.to_string())?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_self_edges_are_rejected() -> Result<(), String> {
    let (_, social) = graph();
    let me = fixtures::owner();
    for err in [
        social.follow(me, me).await.err(),
        social.connect(me, me).await.err(),
        social.block_user(me, me, None).await.err(),
    ] {
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::ValidationFailed));
    }
    Ok(())
}

#[tokio::test]
async fn test_respond_requires_pending_request() -> Result<(), String> {
    let (_, social) = graph();
    let (alice, bob) = fixtures::owner_pair();
    let err = social.respond_to_connection(alice, bob, true).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::EntityNotFound));

    social.connect(bob, alice).await.map_err(|e| e.to_string())?;
    let declined = social
        .respond_to_connection(alice, bob, false)
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(declined.status, ConnectionStatus::Declined);

    // Only the addressee may answer.
    social.connect(alice, fixtures::owner()).await.map_err(|e| e.to_string())?;
    let err = social.respond_to_connection(bob, alice, true).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::EntityNotFound));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Following is idempotent: repeated follows keep a single edge that
    /// shows up on both sides of the graph.
    #[test]
    fn prop_follow_is_idempotent(
        (user, target) in generators::arb_owner_pair(),
        repeats in 1usize..5,
    ) {
        let rt = Runtime::new()
            .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))?;
        rt.block_on(async {
            let (store, social) = graph();
            let mut ids = Vec::new();
            for _ in 0..repeats {
                let edge = social
                    .follow(user, target)
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                ids.push(edge.id);
            }
            ids.dedup();
            prop_assert_eq!(ids.len(), 1);
            prop_assert_eq!(store.row_count("user_follows").await, 1);

            let following = social
                .following(user)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let followers = social
                .followers(target)
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(following.len(), 1);
            prop_assert_eq!(followers.len(), 1);
            prop_assert_eq!(following[0].following_id, target);
            prop_assert_eq!(followers[0].follower_id, user);
            Ok(())
        })?;
    }
}
