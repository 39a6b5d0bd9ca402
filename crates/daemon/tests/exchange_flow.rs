//! Two daemons over real sockets: full NEW/ROTATE rounds, the HTTP status
//! contract of the peer endpoint, single-use key delivery, and timer-driven
//! rotation.

use std::time::Duration;

use anyhow::Result;

use qpskd_daemon::scheduler;
use qpskd_daemon::testkit::{eventually, start_pair, start_pair_with_timers};

#[tokio::test]
async fn test_new_then_rotate_commits_both_ends() -> Result<()> {
    let pair = start_pair().await?;

    let handle = pair
        .initiator
        .state
        .relationship(&pair.relationship_id)
        .unwrap()
        .clone();

    // First round opens with NEW.
    scheduler::rotate_once(&handle).await;

    let responder_handle = pair
        .responder
        .state
        .relationship(&pair.relationship_id)
        .unwrap();
    assert_eq!(handle.relationship.generation(), 1);
    assert_eq!(responder_handle.relationship.generation(), 1);

    let initiator_key = std::fs::read_to_string(pair.initiator.key_file())?;
    let responder_key = std::fs::read_to_string(pair.responder.key_file())?;
    // The two processes agree on the secret without ever sending it.
    assert_eq!(initiator_key, responder_key);
    assert!(!initiator_key.trim().is_empty());

    // Second round rotates the established chain.
    scheduler::rotate_once(&handle).await;

    assert_eq!(handle.relationship.generation(), 2);
    assert_eq!(responder_handle.relationship.generation(), 2);

    let rotated_initiator_key = std::fs::read_to_string(pair.initiator.key_file())?;
    let rotated_responder_key = std::fs::read_to_string(pair.responder.key_file())?;
    assert_eq!(rotated_initiator_key, rotated_responder_key);
    assert_ne!(rotated_initiator_key, initiator_key);

    pair.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_peer_endpoint_status_contract() -> Result<()> {
    let pair = start_pair().await?;
    let client = reqwest::Client::new();
    let base = format!("http://{}", pair.responder.addr);

    // CONFIRM with no round in flight is a protocol error, not ignored.
    let response = client
        .post(format!("{base}/api/v1/peer/pair/confirm"))
        .json(&serde_json::json!({ "generation": 1 }))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    // Unknown relationship.
    let response = client
        .post(format!("{base}/api/v1/peer/elsewhere/new"))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    // A NEW parks a round; a duplicate NEW while it is parked is rejected.
    let response = client
        .post(format!("{base}/api/v1/peer/pair/new"))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ok");
    assert!(body["key_ID"].as_str().is_some_and(|id| !id.is_empty()));

    let duplicate = client
        .post(format!("{base}/api/v1/peer/pair/new"))
        .send()
        .await?;
    assert_eq!(duplicate.status(), reqwest::StatusCode::CONFLICT);

    // The parked round is unaffected by the rejected duplicate.
    let confirm = client
        .post(format!("{base}/api/v1/peer/pair/confirm"))
        .json(&serde_json::json!({ "generation": 1 }))
        .send()
        .await?;
    assert_eq!(confirm.status(), reqwest::StatusCode::OK);
    let responder_handle = pair
        .responder
        .state
        .relationship(&pair.relationship_id)
        .unwrap();
    assert_eq!(responder_handle.relationship.generation(), 1);

    pair.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_simulated_key_delivery_is_single_use() -> Result<()> {
    let pair = start_pair().await?;
    let client = reqwest::Client::new();
    let base = format!("http://{}", pair.initiator.addr);

    let response = client
        .get(format!("{base}/api/v1/keys/sae-b/enc_keys"))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    let key_id = body["keys"][0]["key_ID"].as_str().unwrap().to_string();
    assert!(!body["keys"][0]["key"].as_str().unwrap().is_empty());

    // First redemption consumes the key.
    let response = client
        .get(format!("{base}/api/v1/keys/sae-b/dec_keys"))
        .query(&[("key_ID", key_id.as_str())])
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    // Second redemption finds nothing.
    let response = client
        .get(format!("{base}/api/v1/keys/sae-b/dec_keys"))
        .query(&[("key_ID", key_id.as_str())])
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    // The identifier parameter is mandatory.
    let response = client
        .get(format!("{base}/api/v1/keys/sae-b/dec_keys"))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // Batched delivery is not simulated.
    let response = client
        .get(format!("{base}/api/v1/keys/sae-b/enc_keys"))
        .query(&[("number", "3")])
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    pair.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_simulation_disabled_end_serves_no_keys() -> Result<()> {
    let pair = start_pair().await?;
    let client = reqwest::Client::new();

    // Only the initiator end hosts the simulated key-delivery API.
    let response = client
        .get(format!(
            "http://{}/api/v1/keys/sae-a/enc_keys",
            pair.responder.addr
        ))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    pair.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_rotation_timers_advance_generations() -> Result<()> {
    let pair = start_pair_with_timers(1).await?;

    let initiator = pair
        .initiator
        .state
        .relationship(&pair.relationship_id)
        .unwrap()
        .clone();
    let responder = pair
        .responder
        .state
        .relationship(&pair.relationship_id)
        .unwrap()
        .clone();

    eventually(Duration::from_secs(15), || {
        let initiator = initiator.clone();
        let responder = responder.clone();
        async move {
            Ok(initiator.relationship.generation() >= 2
                && responder.relationship.generation() >= 2)
        }
    })
    .await?;

    // Both published files exist and agree once the pair settles.
    eventually(Duration::from_secs(15), || {
        let a = pair.initiator.key_file();
        let b = pair.responder.key_file();
        let initiator = initiator.clone();
        let responder = responder.clone();
        async move {
            if initiator.relationship.round_in_flight()
                || responder.relationship.round_in_flight()
                || initiator.relationship.generation() != responder.relationship.generation()
            {
                return Ok(false);
            }
            let a = std::fs::read_to_string(a)?;
            let b = std::fs::read_to_string(b)?;
            Ok(!a.trim().is_empty() && a == b)
        }
    })
    .await?;

    pair.stop().await;
    Ok(())
}
