// Profile page: password change and profile image upload share one URL

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::Response,
};
use axum_extra::extract::{cookie::CookieJar, Form};
use chrono::Utc;
use common::auth::verify_password;
use common::errors::ValidationError;
use common::validation::ChangePasswordForm;

use super::{csrf_ok, form_context};
use crate::error::AppError;
use crate::session::{csrf_failure, flash_redirect, CurrentUser, Viewer};
use crate::state::AppState;
use crate::templates;

fn render_profile(
    state: &AppState,
    viewer: &Viewer,
    jar: CookieJar,
    errors: Option<&ValidationError>,
) -> Result<Response, AppError> {
    let context = form_context(&ChangePasswordForm::default(), errors);
    templates::render(state, viewer, jar, "profile.html", context)
}

pub async fn profile_page(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    render_profile(&state, &current.viewer, jar, None)
}

/// Multipart bodies are image uploads, url-encoded ones password changes
pub async fn profile_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    req: Request,
) -> Result<Response, AppError> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload_image(&state, current, jar, multipart).await
    } else {
        let Form(form) = Form::<ChangePasswordForm>::from_request(req, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        change_password(&state, current, jar, form).await
    }
}

#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
async fn change_password(
    state: &AppState,
    current: CurrentUser,
    jar: CookieJar,
    form: ChangePasswordForm,
) -> Result<Response, AppError> {
    if !csrf_ok(state, &current.viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    let new_password = match form.validate() {
        Ok(password) => password,
        Err(errors) => return render_profile(state, &current.viewer, jar, Some(&errors)),
    };

    if !verify_password(&form.current_password, &current.user.password_hash) {
        return Ok(flash_redirect(jar, "danger", "הסיסמה הנוכחית שגויה", "/profile"));
    }

    state.auth.change_password(current.user.id, &new_password).await?;
    tracing::info!("Password changed");
    Ok(flash_redirect(jar, "success", "הסיסמה עודכנה בהצלחה", "/profile"))
}

#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
async fn upload_image(
    state: &AppState,
    current: CurrentUser,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut csrf_token = String::new();
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("csrf_token") => {
                csrf_token = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            Some("image") => {
                let file_name = field.file_name().map(str::to_string).unwrap_or_default();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !file_name.is_empty() && !data.is_empty() {
                    upload = Some((file_name, data));
                }
            }
            _ => {}
        }
    }

    if !csrf_ok(state, &current.viewer, &csrf_token) {
        return Ok(csrf_failure());
    }
    let Some((file_name, data)) = upload else {
        return Ok(flash_redirect(jar, "info", "נא לבחור קובץ תמונה", "/profile"));
    };

    let stored_name = format!(
        "user_{}_{}_{}",
        current.user.id,
        Utc::now().timestamp(),
        sanitize_filename(&file_name)
    );
    let dir = state.uploads_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(format!("create {}: {}", dir.display(), e)))?;
    tokio::fs::write(dir.join(&stored_name), &data)
        .await
        .map_err(|e| AppError::Internal(format!("write {}: {}", stored_name, e)))?;

    let relative = format!("uploads/profile/{}", stored_name);
    state.users.update_profile_image(current.user.id, &relative).await?;
    tracing::info!(path = %relative, bytes = data.len(), "Profile image stored");

    Ok(flash_redirect(jar, "success", "תמונת הפרופיל עודכנה", "/profile"))
}

/// Reduce an uploaded file name to a safe ASCII basename
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my photo.png"), "my_photo.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\dana\\me.jpg"), "me.jpg");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("תמונה.jpg"), "jpg");
        assert_eq!(sanitize_filename("שלום"), "upload");
    }
}
