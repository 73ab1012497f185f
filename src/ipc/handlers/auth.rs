use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::auth_settings;
use crate::ipc::types::{AppState, Request};
use chrono::Duration;
use serde_json::json;

const MAX_ACCESS_TTL_SECONDS: i64 = 86_400 * 30;
const MAX_REFRESH_TTL_SECONDS: i64 = 86_400 * 365;

fn handle_auth_issue(state: &mut AppState, req: &Request) -> serde_json::Value {
    let defaults = match auth_settings(state.db.as_ref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let access = req
        .params
        .get("accessTtlSeconds")
        .and_then(|v| v.as_i64())
        .unwrap_or(defaults.access_ttl_seconds);
    let refresh = req
        .params
        .get("refreshTtlSeconds")
        .and_then(|v| v.as_i64())
        .unwrap_or(defaults.refresh_ttl_seconds);
    if !(0..=MAX_ACCESS_TTL_SECONDS).contains(&access)
        || !(1..=MAX_REFRESH_TTL_SECONDS).contains(&refresh)
    {
        return err(
            &req.id,
            "bad_params",
            "accessTtlSeconds/refreshTtlSeconds out of range",
            Some(json!({ "accessTtlSeconds": access, "refreshTtlSeconds": refresh })),
        );
    }

    let creds = state
        .auth
        .issue(Duration::seconds(access), Duration::seconds(refresh));
    log::info!("issued credentials (access ttl {}s)", access);
    ok(
        &req.id,
        json!({
            "accessExpiresAt": creds.access_expires_at.to_rfc3339(),
            "refreshExpiresAt": creds.refresh_expires_at.to_rfc3339()
        }),
    )
}

fn handle_auth_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, state.auth.status_json())
}

fn handle_auth_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.auth.clear();
    log::info!("credentials cleared");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.issue" => Some(handle_auth_issue(state, req)),
        "auth.status" => Some(handle_auth_status(state, req)),
        "auth.clear" => Some(handle_auth_clear(state, req)),
        _ => None,
    }
}
