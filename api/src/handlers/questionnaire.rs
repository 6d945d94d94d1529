use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{cookie::CookieJar, Form};
use common::errors::ValidationError;
use common::matching::MatchError;
use common::validation::{
    QuestionnaireForm, DURATION_CHOICES, MILITARY_STATUS_CHOICES, POPULATION_CHOICES,
    STUDY_FIELD_CHOICES, STUDY_STATUS_CHOICES, VOLUNTEER_CHOICES, WORK_STATUS_CHOICES,
};

use super::{csrf_ok, form_context};
use crate::error::AppError;
use crate::session::{csrf_failure, flash, CurrentUser, Viewer};
use crate::state::AppState;
use crate::templates;

fn render_questionnaire(
    state: &AppState,
    viewer: &Viewer,
    jar: CookieJar,
    form: &QuestionnaireForm,
    errors: Option<&ValidationError>,
    has_existing: bool,
) -> Result<Response, AppError> {
    let mut context = form_context(form, errors);
    context.insert("has_existing", &has_existing);
    context.insert("study_status_choices", STUDY_STATUS_CHOICES);
    context.insert("study_field_choices", STUDY_FIELD_CHOICES);
    context.insert("military_status_choices", MILITARY_STATUS_CHOICES);
    context.insert("population_choices", POPULATION_CHOICES);
    context.insert("work_status_choices", WORK_STATUS_CHOICES);
    context.insert("volunteer_choices", VOLUNTEER_CHOICES);
    context.insert("duration_choices", DURATION_CHOICES);
    templates::render(state, viewer, jar, "questionnaire.html", context)
}

/// The questionnaire, pre-filled from saved answers
pub async fn questionnaire_page(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let existing = state.questionnaires.find_by_user(current.user.id).await?;
    let form = existing
        .as_ref()
        .map(|q| QuestionnaireForm::from_answers(&q.answers))
        .unwrap_or_default();
    render_questionnaire(&state, &current.viewer, jar, &form, None, existing.is_some())
}

/// Save the answers and recompute matches right away
#[tracing::instrument(skip_all, fields(user_id = current.user.id))]
pub async fn questionnaire_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Form(form): Form<QuestionnaireForm>,
) -> Result<Response, AppError> {
    if !csrf_ok(&state, &current.viewer, &form.csrf_token) {
        return Ok(csrf_failure());
    }
    let answers = match form.validate() {
        Ok(answers) => answers,
        Err(errors) => {
            let has_existing = state.questionnaires.find_by_user(current.user.id).await?.is_some();
            return render_questionnaire(
                &state,
                &current.viewer,
                jar,
                &form,
                Some(&errors),
                has_existing,
            );
        }
    };

    state.questionnaires.upsert(current.user.id, &answers).await?;

    let jar = match state.matches.refresh(current.user.id).await {
        Ok(_) => jar,
        Err(MatchError::Notion(e)) => flash(jar, "info", e.user_message()),
        Err(MatchError::NoQuestionnaire) => jar,
        Err(MatchError::Database(e)) => return Err(e.into()),
    };

    Ok((jar, Redirect::to("/my-scholarships?refreshed=1")).into_response())
}
