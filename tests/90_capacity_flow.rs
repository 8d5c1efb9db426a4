// Full back-office flow against a live database: login as an admin, create a
// manager and a one-slot team, then fill the team and watch the capacity
// guard reject the overflow.
//
// Ignored by default: needs DATABASE_URL pointing at a migrated database plus
// CPMS_E2E_ADMIN_EMAIL / CPMS_E2E_ADMIN_PASSWORD for a seeded admin account.
// Run with: cargo test --test 90_capacity_flow -- --ignored
mod common;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos()
}

async fn admin_login(base_url: &str, client: &reqwest::Client) -> Result<String> {
    let email = std::env::var("CPMS_E2E_ADMIN_EMAIL").context("CPMS_E2E_ADMIN_EMAIL not set")?;
    let password =
        std::env::var("CPMS_E2E_ADMIN_PASSWORD").context("CPMS_E2E_ADMIN_PASSWORD not set")?;

    let res = client
        .post(format!("{}/auth/login", base_url))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK, "admin login failed");

    let body: Value = res.json().await?;
    let jwt = body["data"]["token"].as_str().context("no token in login response")?;
    Ok(jwt.to_string())
}

#[tokio::test]
#[ignore]
async fn team_capacity_guard_end_to_end() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let jwt = admin_login(&server.base_url, &client).await?;
    let suffix = unique_suffix();

    // Manager to own the team
    let res = client
        .post(format!("{}/api/project-managers", server.base_url))
        .bearer_auth(&jwt)
        .json(&json!({ "manager_name": format!("e2e-manager-{suffix}") }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/api/project-managers/select", server.base_url))
        .bearer_auth(&jwt)
        .send()
        .await?;
    let body: Value = res.json().await?;
    let manager_token = body["data"]
        .as_array()
        .and_then(|ms| {
            ms.iter()
                .find(|m| m["manager_name"] == format!("e2e-manager-{suffix}").as_str())
        })
        .and_then(|m| m["manager_id"].as_str())
        .context("created manager not in select list")?
        .to_string();

    // Identifier tokens are opaque, never the raw id
    assert!(manager_token.parse::<i64>().is_err(), "token looks numeric: {manager_token}");

    // One-slot development team
    let res = client
        .post(format!("{}/api/development-teams", server.base_url))
        .bearer_auth(&jwt)
        .json(&json!({
            "team_name": format!("e2e-team-{suffix}"),
            "team_size": 1,
            "manager_id": manager_token,
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/api/development-teams/select", server.base_url))
        .bearer_auth(&jwt)
        .send()
        .await?;
    let body: Value = res.json().await?;
    let team_token = body["data"]
        .as_array()
        .and_then(|ts| {
            ts.iter()
                .find(|t| t["team_name"] == format!("e2e-team-{suffix}").as_str())
        })
        .and_then(|t| t["team_id"].as_str())
        .context("created team not in select list")?
        .to_string();

    // First user takes the only slot
    let res = client
        .post(format!("{}/api/users", server.base_url))
        .bearer_auth(&jwt)
        .json(&json!({
            "name": format!("e2e-user-a-{suffix}"),
            "email": format!("e2e-a-{suffix}@example.com"),
            "phone": format!("+63900{}", suffix % 10_000_000),
            "role": "employee",
            "development_team_ids": [team_token],
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    // Second user must be rejected with the failure pinned to the team field,
    // and the whole create rolled back
    let overflow_email = format!("e2e-b-{suffix}@example.com");
    let res = client
        .post(format!("{}/api/users", server.base_url))
        .bearer_auth(&jwt)
        .json(&json!({
            "name": format!("e2e-user-b-{suffix}"),
            "email": overflow_email,
            "phone": format!("+63901{}", suffix % 10_000_000),
            "role": "employee",
            "development_team_ids": [team_token],
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = res.json().await?;
    assert_eq!(body["result"], false);
    let msg = body["errors"]["development_team_ids"][0]
        .as_str()
        .context("capacity error not attributed to development_team_ids")?;
    assert!(msg.contains("maximum size"), "unexpected message: {msg}");

    // The rejected user must not exist at all
    let res = client
        .get(format!("{}/api/users", server.base_url))
        .query(&[("search", overflow_email.as_str())])
        .bearer_auth(&jwt)
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));

    Ok(())
}

#[tokio::test]
#[ignore]
async fn team_size_cannot_shrink_below_membership() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let jwt = admin_login(&server.base_url, &client).await?;
    let suffix = unique_suffix();

    let res = client
        .post(format!("{}/api/project-managers", server.base_url))
        .bearer_auth(&jwt)
        .json(&json!({ "manager_name": format!("e2e-shrink-mgr-{suffix}") }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/api/project-managers/select", server.base_url))
        .bearer_auth(&jwt)
        .send()
        .await?;
    let body: Value = res.json().await?;
    let manager_token = body["data"]
        .as_array()
        .and_then(|ms| {
            ms.iter()
                .find(|m| m["manager_name"] == format!("e2e-shrink-mgr-{suffix}").as_str())
        })
        .and_then(|m| m["manager_id"].as_str())
        .context("manager not in select list")?
        .to_string();

    let res = client
        .post(format!("{}/api/development-teams", server.base_url))
        .bearer_auth(&jwt)
        .json(&json!({
            "team_name": format!("e2e-shrink-team-{suffix}"),
            "team_size": 3,
            "manager_id": manager_token,
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/api/development-teams/select", server.base_url))
        .bearer_auth(&jwt)
        .send()
        .await?;
    let body: Value = res.json().await?;
    let team_token = body["data"]
        .as_array()
        .and_then(|ts| {
            ts.iter()
                .find(|t| t["team_name"] == format!("e2e-shrink-team-{suffix}").as_str())
        })
        .and_then(|t| t["team_id"].as_str())
        .context("team not in select list")?
        .to_string();

    // Two members
    for tag in ["c", "d"] {
        let res = client
            .post(format!("{}/api/users", server.base_url))
            .bearer_auth(&jwt)
            .json(&json!({
                "name": format!("e2e-user-{tag}-{suffix}"),
                "email": format!("e2e-{tag}-{suffix}@example.com"),
                "phone": format!("+6390{tag}{}", suffix % 10_000_000),
                "role": "employee",
                "development_team_ids": [team_token],
            }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    // Shrinking under the member count must be rejected on team_size
    let res = client
        .put(format!("{}/api/development-teams/{}", server.base_url, team_token))
        .bearer_auth(&jwt)
        .json(&json!({
            "team_name": format!("e2e-shrink-team-{suffix}"),
            "team_size": 1,
            "manager_id": manager_token,
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await?;
    assert!(body["errors"]["team_size"].is_array());

    // Down to exactly the member count is fine
    let res = client
        .put(format!("{}/api/development-teams/{}", server.base_url, team_token))
        .bearer_auth(&jwt)
        .json(&json!({
            "team_name": format!("e2e-shrink-team-{suffix}"),
            "team_size": 2,
            "manager_id": manager_token,
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
#[ignore]
async fn raw_ids_are_rejected_on_the_wire() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let jwt = admin_login(&server.base_url, &client).await?;

    // A numeric path parameter must never resolve to a row
    let res = client
        .get(format!("{}/api/users/1", server.base_url))
        .bearer_auth(&jwt)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = res.json().await?;
    assert_eq!(body["result"], false);
    Ok(())
}
