use crate::{
    AppState,
    auth::{self, AuthUser},
    catalog,
    errors::{AppError, StoreError},
    extract::{Form, Json, Path, Query},
    models::{
        ChangePasswordForm, Estado, Ficha, FichaEditView, FichaForm, FichaSaved, FichaSearch,
        LoginRequest, LoginResponse, NewUser, NewVisualSolution, Notice, User, UserForm,
        UserProfile, UserSaved, UserUpdate, VisualSolution, VisualSolutionSaved,
    },
    permissions::Capability,
};
use axum::{extract::State, http::StatusCode};
use std::collections::HashMap;

// --- Session ---

/// login
///
/// [Public Route] Exchanges credentials for a session token. An unknown username and a wrong
/// password produce the same `InvalidCredentials` error.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = Notice)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::InvalidCredentials);
    }

    let user = state
        .repo
        .find_user_by_username(username)
        .await?
        .filter(|user| auth::verify_password(&payload.password, &user.password_hash))
        .ok_or_else(|| {
            tracing::info!(username, "login rejected");
            AppError::InvalidCredentials
        })?;

    let token = auth::issue_token(user.id, &state.config)?;
    tracing::info!(user_id = user.id, role = user.role.as_str(), "login succeeded");

    Ok(Json(LoginResponse {
        token,
        user: AuthUser::from(user).profile(),
    }))
}

/// logout
///
/// [Authenticated Route] Tokens are stateless; the client discards its copy.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 200, description = "Session closed", body = Notice))
)]
pub async fn logout(auth: AuthUser) -> Json<Notice> {
    tracing::info!(user_id = auth.id, "logout");
    Json(Notice::info("Has cerrado sesión correctamente"))
}

/// get_me
///
/// [Authenticated Route] The current agent with the capabilities it holds right now.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current profile", body = UserProfile))
)]
pub async fn get_me(auth: AuthUser) -> Json<UserProfile> {
    Json(auth.profile())
}

/// change_password
///
/// [Authenticated Route] Self-service password rotation. The current password must verify
/// against the stored hash before the new one is written.
#[utoipa::path(
    post,
    path = "/password",
    request_body(content = ChangePasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Password changed", body = Notice),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 422, description = "Validation failed", body = Notice)
    )
)]
pub async fn change_password(
    auth: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Json<Notice>, AppError> {
    auth.require(Capability::ChangeOwnPassword)?;
    form.validate()?;

    let user = state
        .repo
        .get_user(auth.id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    if !auth::verify_password(&form.password_actual, &user.password_hash) {
        return Err(AppError::validation("La contraseña actual es incorrecta"));
    }

    let password_hash = auth::hash_password(&form.nueva_password)?;
    if !state.repo.update_password(auth.id, &password_hash).await? {
        return Err(AppError::Unauthenticated);
    }

    tracing::info!(user_id = auth.id, "password changed");
    Ok(Json(Notice::success("Contraseña actualizada correctamente")))
}

// --- Fichas ---

fn ficha_not_found() -> AppError {
    AppError::NotFound("Ficha no encontrada".to_string())
}

/// list_fichas
///
/// [Authenticated Route] Every ficha, most recently updated first.
#[utoipa::path(
    get,
    path = "/fichas",
    responses((status = 200, description = "Fichas", body = [Ficha]))
)]
pub async fn list_fichas(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Ficha>>, AppError> {
    auth.require(Capability::ViewRecords)?;
    Ok(Json(state.repo.list_fichas().await?))
}

/// search_fichas
///
/// [Authenticated Route] Filters by exact category and by a substring of the title or
/// keywords. Blank parameters are ignored.
#[utoipa::path(
    get,
    path = "/fichas/search",
    params(FichaSearch),
    responses((status = 200, description = "Matching fichas", body = [Ficha]))
)]
pub async fn search_fichas(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(search): Query<FichaSearch>,
) -> Result<Json<Vec<Ficha>>, AppError> {
    auth.require(Capability::ViewRecords)?;
    Ok(Json(state.repo.search_fichas(&search).await?))
}

#[utoipa::path(
    get,
    path = "/fichas/{id}",
    params(("id" = i32, Path, description = "Ficha id")),
    responses(
        (status = 200, description = "Ficha", body = Ficha),
        (status = 404, description = "Not Found", body = Notice)
    )
)]
pub async fn get_ficha(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Ficha>, AppError> {
    auth.require(Capability::ViewRecords)?;
    let ficha = state.repo.get_ficha(id).await?.ok_or_else(ficha_not_found)?;
    Ok(Json(ficha))
}

/// edit_ficha_form
///
/// [Authenticated Route] The stored ficha rendered back into its editable form, with list
/// fields joined one item per line.
#[utoipa::path(
    get,
    path = "/fichas/{id}/edit",
    params(("id" = i32, Path, description = "Ficha id")),
    responses(
        (status = 200, description = "Edit view", body = FichaEditView),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 404, description = "Not Found", body = Notice)
    )
)]
pub async fn edit_ficha_form(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FichaEditView>, AppError> {
    auth.require(Capability::EditRecords)?;
    let ficha = state.repo.get_ficha(id).await?.ok_or_else(ficha_not_found)?;

    Ok(Json(FichaEditView {
        id: ficha.id,
        form: FichaForm::from_ficha(&ficha),
        categorias: catalog::categories().into_iter().map(String::from).collect(),
        problemas: catalog::problems_for(&ficha.categoria)
            .iter()
            .map(|p| p.to_string())
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/fichas",
    request_body(content = FichaForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "Ficha created", body = FichaSaved),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 422, description = "Validation failed", body = Notice)
    )
)]
pub async fn create_ficha(
    auth: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<FichaForm>,
) -> Result<(StatusCode, Json<FichaSaved>), AppError> {
    auth.require(Capability::AddRecords)?;
    let new_ficha = form.validate()?;

    let ficha = state.repo.create_ficha(&new_ficha).await?;
    tracing::info!(user_id = auth.id, ficha_id = ficha.id, "ficha created");

    Ok((
        StatusCode::CREATED,
        Json(FichaSaved {
            notice: Notice::success("Ficha agregada correctamente"),
            ficha,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/fichas/{id}",
    params(("id" = i32, Path, description = "Ficha id")),
    request_body(content = FichaForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Ficha updated", body = FichaSaved),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 404, description = "Not Found", body = Notice),
        (status = 422, description = "Validation failed", body = Notice)
    )
)]
pub async fn update_ficha(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Form(form): Form<FichaForm>,
) -> Result<Json<FichaSaved>, AppError> {
    auth.require(Capability::EditRecords)?;
    let changes = form.validate()?;

    let ficha = state
        .repo
        .update_ficha(id, &changes)
        .await?
        .ok_or_else(ficha_not_found)?;
    tracing::info!(user_id = auth.id, ficha_id = id, "ficha updated");

    Ok(Json(FichaSaved {
        notice: Notice::success("Ficha actualizada correctamente"),
        ficha,
    }))
}

/// delete_ficha
///
/// [Authenticated Route] Requires `delete_records`. The capability is checked before the
/// store is touched, so a denied request leaves the ficha unchanged.
#[utoipa::path(
    delete,
    path = "/fichas/{id}",
    params(("id" = i32, Path, description = "Ficha id")),
    responses(
        (status = 200, description = "Deleted", body = Notice),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 404, description = "Not Found", body = Notice)
    )
)]
pub async fn delete_ficha(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Notice>, AppError> {
    auth.require(Capability::DeleteRecords)?;

    if !state.repo.delete_ficha(id).await? {
        return Err(ficha_not_found());
    }
    tracing::info!(user_id = auth.id, ficha_id = id, "ficha deleted");
    Ok(Json(Notice::success("Ficha eliminada correctamente")))
}

/// problems_by_category
///
/// [Authenticated Route] Canned problem titles for a category. Unknown categories yield an
/// empty list.
#[utoipa::path(
    get,
    path = "/api/problemas/{categoria}",
    params(("categoria" = String, Path, description = "TV, Internet or Equipo")),
    responses((status = 200, description = "Problem titles", body = [String]))
)]
pub async fn problems_by_category(_auth: AuthUser, Path(categoria): Path<String>) -> Json<Vec<String>> {
    Json(
        catalog::problems_for(&categoria)
            .iter()
            .map(|p| p.to_string())
            .collect(),
    )
}

// --- Visual solutions ---

fn visual_solution_not_found() -> AppError {
    AppError::NotFound("Solución visual no encontrada".to_string())
}

/// list_visual_solutions
///
/// [Authenticated Route] Active guides for every agent; inactive ones are included only for
/// holders of `manage_visual_solutions`.
#[utoipa::path(
    get,
    path = "/soluciones-visuales",
    responses((status = 200, description = "Visual solutions", body = [VisualSolution]))
)]
pub async fn list_visual_solutions(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<VisualSolution>>, AppError> {
    auth.require(Capability::ViewRecords)?;
    let include_inactive = auth.can(Capability::ManageVisualSolutions);
    Ok(Json(state.repo.list_visual_solutions(include_inactive).await?))
}

#[utoipa::path(
    get,
    path = "/soluciones-visuales/{id}",
    params(("id" = i32, Path, description = "Visual solution id")),
    responses(
        (status = 200, description = "Visual solution", body = VisualSolution),
        (status = 404, description = "Not Found", body = Notice)
    )
)]
pub async fn get_visual_solution(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<VisualSolution>, AppError> {
    auth.require(Capability::ViewRecords)?;
    let can_manage = auth.can(Capability::ManageVisualSolutions);

    // Inactive guides are invisible, not forbidden, to regular agents.
    let solution = state
        .repo
        .get_visual_solution(id)
        .await?
        .filter(|s| can_manage || s.estado == Estado::Activo)
        .ok_or_else(visual_solution_not_found)?;
    Ok(Json(solution))
}

/// create_visual_solution
///
/// [Authenticated Route] Form fields `titulo`, `categoria`, `descripcion`, `estado` plus the
/// numbered step fields `paso_titulo_{i}`, `paso_descripcion_{i}`, `paso_imagen_{i}`.
#[utoipa::path(
    post,
    path = "/soluciones-visuales",
    responses(
        (status = 201, description = "Created", body = VisualSolutionSaved),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 422, description = "Validation failed", body = Notice)
    )
)]
pub async fn create_visual_solution(
    auth: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<(StatusCode, Json<VisualSolutionSaved>), AppError> {
    auth.require(Capability::ManageVisualSolutions)?;
    let new_solution = NewVisualSolution::from_form(&form)?;

    let solution = state.repo.create_visual_solution(&new_solution).await?;
    tracing::info!(
        user_id = auth.id,
        solution_id = solution.id,
        steps = solution.pasos.len(),
        "visual solution created"
    );

    Ok((
        StatusCode::CREATED,
        Json(VisualSolutionSaved {
            notice: Notice::success("Solución visual creada correctamente"),
            solution,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/soluciones-visuales/{id}",
    params(("id" = i32, Path, description = "Visual solution id")),
    responses(
        (status = 200, description = "Updated", body = VisualSolutionSaved),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 404, description = "Not Found", body = Notice),
        (status = 422, description = "Validation failed", body = Notice)
    )
)]
pub async fn update_visual_solution(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<VisualSolutionSaved>, AppError> {
    auth.require(Capability::ManageVisualSolutions)?;
    let changes = NewVisualSolution::from_form(&form)?;

    let solution = state
        .repo
        .update_visual_solution(id, &changes)
        .await?
        .ok_or_else(visual_solution_not_found)?;
    tracing::info!(user_id = auth.id, solution_id = id, "visual solution updated");

    Ok(Json(VisualSolutionSaved {
        notice: Notice::success("Solución visual actualizada correctamente"),
        solution,
    }))
}

#[utoipa::path(
    delete,
    path = "/soluciones-visuales/{id}",
    params(("id" = i32, Path, description = "Visual solution id")),
    responses(
        (status = 200, description = "Deleted", body = Notice),
        (status = 403, description = "Capability missing", body = Notice),
        (status = 404, description = "Not Found", body = Notice)
    )
)]
pub async fn delete_visual_solution(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Notice>, AppError> {
    auth.require(Capability::ManageVisualSolutions)?;

    if !state.repo.delete_visual_solution(id).await? {
        return Err(visual_solution_not_found());
    }
    tracing::info!(user_id = auth.id, solution_id = id, "visual solution deleted");
    Ok(Json(Notice::success("Solución visual eliminada correctamente")))
}

// --- User administration ---

fn user_not_found() -> AppError {
    AppError::NotFound("Usuario no encontrado".to_string())
}

// Usernames are unique; the store reports the collision, the handler names it.
fn username_taken(e: StoreError) -> AppError {
    match e {
        StoreError::UniqueViolation => AppError::Integrity("El usuario ya existe".to_string()),
        other => other.into(),
    }
}

/// list_users
///
/// [Admin Route] Every account, newest first.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "Users", body = [User]),
        (status = 403, description = "Not Admin", body = Notice)
    )
)]
pub async fn list_users(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, AppError> {
    auth.require(Capability::ManageUsers)?;
    Ok(Json(state.repo.list_users().await?))
}

/// create_user
///
/// [Admin Route] New accounts always get `view_records` and `change_own_password`; the
/// remaining capabilities come from the checked boxes.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body(content = UserForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "User created", body = UserSaved),
        (status = 403, description = "Not Admin", body = Notice),
        (status = 409, description = "Username taken", body = Notice),
        (status = 422, description = "Validation failed", body = Notice)
    )
)]
pub async fn create_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<UserForm>,
) -> Result<(StatusCode, Json<UserSaved>), AppError> {
    auth.require(Capability::ManageUsers)?;
    let (username, role) = form.validate_new()?;

    let new_user = NewUser {
        username,
        password_hash: auth::hash_password(&form.password)?,
        role,
        permissions: form.permissions(),
    };
    let user = state.repo.create_user(new_user).await.map_err(username_taken)?;
    tracing::info!(admin_id = auth.id, user_id = user.id, "user created");

    Ok((
        StatusCode::CREATED,
        Json(UserSaved {
            notice: Notice::success("Usuario creado correctamente"),
            user,
        }),
    ))
}

/// update_user
///
/// [Admin Route] A blank password keeps the stored credential.
#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body(content = UserForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "User updated", body = UserSaved),
        (status = 403, description = "Not Admin", body = Notice),
        (status = 404, description = "Not Found", body = Notice),
        (status = 409, description = "Username taken", body = Notice)
    )
)]
pub async fn update_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Form(form): Form<UserForm>,
) -> Result<Json<UserSaved>, AppError> {
    auth.require(Capability::ManageUsers)?;
    let (username, role) = form.validate_edit()?;

    let password_hash = if form.password.is_empty() {
        None
    } else {
        Some(auth::hash_password(&form.password)?)
    };
    let update = UserUpdate {
        username,
        password_hash,
        role,
        permissions: form.permissions(),
    };

    let user = state
        .repo
        .update_user(id, update)
        .await
        .map_err(username_taken)?
        .ok_or_else(user_not_found)?;
    tracing::info!(admin_id = auth.id, user_id = id, "user updated");

    Ok(Json(UserSaved {
        notice: Notice::success("Usuario actualizado correctamente"),
        user,
    }))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "Deleted", body = Notice),
        (status = 403, description = "Not Admin", body = Notice),
        (status = 404, description = "Not Found", body = Notice),
        (status = 422, description = "Own account", body = Notice)
    )
)]
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Notice>, AppError> {
    auth.require(Capability::ManageUsers)?;
    if id == auth.id {
        return Err(AppError::validation("No puedes eliminar tu propio usuario"));
    }

    if !state.repo.delete_user(id).await? {
        return Err(user_not_found());
    }
    tracing::info!(admin_id = auth.id, user_id = id, "user deleted");
    Ok(Json(Notice::success("Usuario eliminado correctamente")))
}
