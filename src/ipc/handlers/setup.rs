use crate::db;
use crate::dispatch::{GradeScale, GRADE_MIN};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Auth,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "auth" => Some(Self::Auth),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Auth => "setup.auth",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "maxGrade": 100.0,
            "displayDecimals": 2
        }),
        SetupSection::Auth => json!({
            "accessTtlSeconds": 900,
            "refreshTtlSeconds": 604800
        }),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GradingSettings {
    pub scale: GradeScale,
    pub display_decimals: u32,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            scale: GradeScale::default(),
            display_decimals: 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_f64_range(v: &Value, key: &str, min_exclusive: f64, max: f64) -> Result<f64, String> {
    let Some(n) = v.as_f64() else {
        return Err(format!("{} must be a number", key));
    };
    if !(n > min_exclusive && n <= max) {
        return Err(format!("{} must be in ({}, {}]", key, min_exclusive, max));
    }
    Ok(n)
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let Some(n) = v.as_i64() else {
        return Err(format!("{} must be an integer", key));
    };
    if n < min || n > max {
        return Err(format!("{} must be between {} and {}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "maxGrade" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, GRADE_MIN, 1000.0)?));
                }
                "displayDecimals" => {
                    obj.insert(k.clone(), json!(parse_i64_range(v, k, 0, 4)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Auth => match k.as_str() {
                "accessTtlSeconds" => {
                    obj.insert(k.clone(), json!(parse_i64_range(v, k, 0, 86_400 * 30)?));
                }
                "refreshTtlSeconds" => {
                    obj.insert(k.clone(), json!(parse_i64_range(v, k, 1, 86_400 * 365)?));
                }
                _ => return Err(format!("unknown auth field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best effort per key: a malformed stored value falls back to
            // its default without discarding the other keys.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                if let Err(msg) = merge_section_patch(section, &mut current, &one) {
                    log::warn!("ignoring stored {}.{}: {}", section.key(), k, msg);
                }
            }
        }
    }
    Ok(current)
}

pub fn grading_settings(conn: &rusqlite::Connection) -> anyhow::Result<GradingSettings> {
    let v = load_section(conn, SetupSection::Grading)?;
    let defaults = GradingSettings::default();
    Ok(GradingSettings {
        scale: GradeScale {
            min: GRADE_MIN,
            max: v
                .get("maxGrade")
                .and_then(|x| x.as_f64())
                .unwrap_or(defaults.scale.max),
        },
        display_decimals: v
            .get("displayDecimals")
            .and_then(|x| x.as_u64())
            .map(|n| n as u32)
            .unwrap_or(defaults.display_decimals),
    })
}

pub fn auth_settings(conn: Option<&rusqlite::Connection>) -> anyhow::Result<AuthSettings> {
    let v = match conn {
        Some(c) => load_section(c, SetupSection::Auth)?,
        None => default_section(SetupSection::Auth),
    };
    Ok(AuthSettings {
        access_ttl_seconds: v
            .get("accessTtlSeconds")
            .and_then(|x| x.as_i64())
            .unwrap_or(900),
        refresh_ttl_seconds: v
            .get("refreshTtlSeconds")
            .and_then(|x| x.as_i64())
            .unwrap_or(604_800),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let grading = match load_section(conn, SetupSection::Grading) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let auth = match load_section(conn, SetupSection::Auth) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "grading": grading, "auth": auth }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    log::info!("updated {}", section.key());
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
