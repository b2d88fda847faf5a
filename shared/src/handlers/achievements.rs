use crate::achievements::AchievementWorkflow;
use crate::response;
use crate::types::{AchievementInput, Principal, SubmitAchievementRequest};
use lambda_http::{http::StatusCode, Body, Error, Response};

/// GET /achievements - the caller's own achievements, newest first
pub async fn list_achievements(
    workflow: &AchievementWorkflow,
    principal: &Principal,
) -> Result<Response<Body>, Error> {
    match workflow.list_by_owner(&principal.id).await {
        Ok(achievements) => {
            response::success(StatusCode::OK, "Achievements retrieved", &achievements)
        }
        Err(e) => response::failure(&e),
    }
}

/// GET /achievements/{id}
///
/// Admins may read any record; everyone else only their own.
pub async fn get_achievement(
    workflow: &AchievementWorkflow,
    principal: &Principal,
    id: &str,
) -> Result<Response<Body>, Error> {
    let result = if principal.is_admin() {
        workflow.get_by_id(id).await
    } else {
        workflow.get_for_owner(id, &principal.id).await
    };
    match result {
        Ok(achievement) => response::success(StatusCode::OK, "Achievement retrieved", &achievement),
        Err(e) => response::failure(&e),
    }
}

/// POST /achievements
pub async fn create_achievement(
    workflow: &AchievementWorkflow,
    principal: &Principal,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let input: AchievementInput = match serde_json::from_slice(body) {
        Ok(input) => input,
        Err(e) => return response::invalid_body(e),
    };

    match workflow.create(&principal.id, input).await {
        Ok(achievement) => {
            response::success(StatusCode::CREATED, "Achievement created", &achievement)
        }
        Err(e) => response::failure(&e),
    }
}

/// PUT /achievements/{id}
pub async fn update_achievement(
    workflow: &AchievementWorkflow,
    principal: &Principal,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let input: AchievementInput = match serde_json::from_slice(body) {
        Ok(input) => input,
        Err(e) => return response::invalid_body(e),
    };

    match workflow.update(id, &principal.id, input).await {
        Ok(achievement) => response::success(StatusCode::OK, "Achievement updated", &achievement),
        Err(e) => response::failure(&e),
    }
}

/// DELETE /achievements/{id}
pub async fn delete_achievement(
    workflow: &AchievementWorkflow,
    principal: &Principal,
    id: &str,
) -> Result<Response<Body>, Error> {
    match workflow.delete(id, &principal.id).await {
        Ok(()) => response::success(
            StatusCode::OK,
            "Achievement deleted",
            &serde_json::Value::Null,
        ),
        Err(e) => response::failure(&e),
    }
}

/// POST /achievements/{id}/submit - body is optional, `{"notes": "..."}`
pub async fn submit_achievement(
    workflow: &AchievementWorkflow,
    principal: &Principal,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: SubmitAchievementRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SubmitAchievementRequest::default()
    } else {
        match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(e) => return response::invalid_body(e),
        }
    };

    match workflow.submit(id, &principal.id, &req.notes).await {
        Ok(achievement) => {
            response::success(StatusCode::OK, "Achievement submitted", &achievement)
        }
        Err(e) => response::failure(&e),
    }
}

/// POST /achievements/{id}/reconcile - admin only, enforced by the router
pub async fn reconcile_achievement(
    workflow: &AchievementWorkflow,
    id: &str,
) -> Result<Response<Body>, Error> {
    match workflow.reconcile_mirror(id).await {
        Ok(outcome) => response::success(
            StatusCode::OK,
            "Mirror reconciled",
            &serde_json::json!({ "id": id, "outcome": outcome }),
        ),
        Err(e) => response::failure(&e),
    }
}
