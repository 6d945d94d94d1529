// Contact inquiries and scholarship submissions

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::Response,
};
use axum_extra::extract::{cookie::CookieJar, Form};
use common::models::{NewInquiry, NewSubmission};
use common::validation::{ContactForm, SubmissionForm};

use super::{csrf_ok, form_context};
use crate::error::AppError;
use crate::session::{client_ip, csrf_failure, flash_redirect, CurrentUser};
use crate::state::AppState;
use crate::templates;

pub async fn contact_page(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let context = form_context(&ContactForm::default(), None);
    templates::render(&state, &current.viewer, jar, "contact.html", context)
}

#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
pub async fn contact_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Form(form): Form<ContactForm>,
) -> Result<Response, AppError> {
    if !csrf_ok(&state, &current.viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    let message = match form.validate() {
        Ok(message) => message,
        Err(errors) => {
            let context = form_context(&form, Some(&errors));
            return templates::render(&state, &current.viewer, jar, "contact.html", context);
        }
    };

    state
        .inquiries
        .create(&NewInquiry {
            user_id: Some(current.user.id),
            full_name: message.full_name,
            email: message.email,
            phone: message.phone,
            subject: message.subject,
            message: message.message,
            ip: client_ip(&headers, peer.as_ref()),
        })
        .await?;

    Ok(flash_redirect(jar, "success", "תודה! ההודעה נקלטה במערכת.", "/contact"))
}

pub async fn send_page(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let context = form_context(&SubmissionForm::default(), None);
    templates::render(&state, &current.viewer, jar, "send.html", context)
}

#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
pub async fn send_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Form(form): Form<SubmissionForm>,
) -> Result<Response, AppError> {
    if !csrf_ok(&state, &current.viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            let context = form_context(&form, Some(&errors));
            return templates::render(&state, &current.viewer, jar, "send.html", context);
        }
    };

    state
        .submissions
        .create(&NewSubmission {
            user_id: current.user.id,
            scholarship_name: input.scholarship_name,
            interest_area: input.interest_area,
            has_submitted: input.has_submitted,
            notes: input.notes,
            ip: client_ip(&headers, peer.as_ref()),
        })
        .await?;

    Ok(flash_redirect(jar, "success", "המידע נשמר בהצלחה.", "/send"))
}
