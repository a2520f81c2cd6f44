use serde_json::json;
use std::path::PathBuf;

use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn required_path(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing params.{}", key), None))
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match required_path(req, "outPath") {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:?}"), None),
    }
}

// Import swaps the database file under us, so the open connection is
// dropped first and reopened on the imported file.
fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match required_path(req, "inPath") {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    state.db = None;
    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(summary) => summary,
        Err(e) => {
            // Keep the daemon usable on a bad bundle.
            if let Ok(conn) = db::open_db(&workspace) {
                state.db = Some(conn);
            }
            return err(&req.id, "import_failed", format!("{e:?}"), None);
        }
    };
    match db::open_db(&workspace) {
        Ok(conn) => {
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace.to_string_lossy(),
                    "bundleFormatDetected": summary.bundle_format_detected,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_export(state, req)),
        "backup.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
