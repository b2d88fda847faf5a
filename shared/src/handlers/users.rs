use crate::response;
use crate::types::{AssignRoleRequest, CreateUserRequest, UpdateUserRequest, UserQuery};
use crate::users::UserDirectory;
use lambda_http::{http::StatusCode, Body, Error, Response};

/// GET /users?page=&limit=&sort_by=&order=&search=
pub async fn list_users(
    directory: &UserDirectory,
    query: UserQuery,
) -> Result<Response<Body>, Error> {
    match directory.list(query).await {
        Ok(page) => response::success_with_meta("Users retrieved", &page.items, &page.meta),
        Err(e) => response::failure(&e),
    }
}

/// GET /users/{id}
pub async fn get_user(directory: &UserDirectory, id: &str) -> Result<Response<Body>, Error> {
    match directory.get(id).await {
        Ok(user) => response::success(StatusCode::OK, "User retrieved", &user),
        Err(e) => response::failure(&e),
    }
}

/// POST /users
pub async fn create_user(directory: &UserDirectory, body: &[u8]) -> Result<Response<Body>, Error> {
    let req: CreateUserRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return response::invalid_body(e),
    };

    match directory.create(req).await {
        Ok(user) => response::success(StatusCode::CREATED, "User created", &user),
        Err(e) => response::failure(&e),
    }
}

/// PUT /users/{id}
pub async fn update_user(
    directory: &UserDirectory,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: UpdateUserRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return response::invalid_body(e),
    };

    match directory.update(id, req).await {
        Ok(user) => response::success(StatusCode::OK, "User updated", &user),
        Err(e) => response::failure(&e),
    }
}

/// DELETE /users/{id}
pub async fn delete_user(directory: &UserDirectory, id: &str) -> Result<Response<Body>, Error> {
    match directory.delete(id).await {
        Ok(()) => response::success(StatusCode::OK, "User deleted", &serde_json::Value::Null),
        Err(e) => response::failure(&e),
    }
}

/// PUT /users/{id}/role
pub async fn assign_role(
    directory: &UserDirectory,
    id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: AssignRoleRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => return response::invalid_body(e),
    };

    match directory.assign_role(id, req).await {
        Ok(user) => response::success(StatusCode::OK, "Role assigned", &user),
        Err(e) => response::failure(&e),
    }
}
