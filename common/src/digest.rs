// Daily digest of open scholarships
//
// Once a day, after the run window opens, every user tracking at least one
// scholarship gets a personalised email listing the catalogue entries open
// today. The admin is told when nothing is open.

use crate::db::repositories::{JobRunRepository, UserRepository, UserScholarshipRepository};
use crate::errors::DigestError;
use crate::make::{MakeEvent, MakePayload, Notifier};
use crate::models::ScholarshipStatus;
use crate::notion::{Scholarship, ScholarshipSource};
use crate::schedule::DailySchedule;
use crate::telemetry;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

pub const JOB_NAME: &str = "scholarships_digest";

const OPEN_FIELD_NAMES: &[&str] = &["תאריך פתיחה", "מועד פתיחה", "פתיחה", "open", "start", "from"];
const CLOSE_FIELD_NAMES: &[&str] = &[
    "תאריך סיום",
    "מועד אחרון",
    "דדליין",
    "deadline",
    "close",
    "end",
    "to",
];
const SUMMARY_FIELD_NAMES: &[&str] = &["תיאור", "תקציר", "summary", "פרטים"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

pub const SUBJECT_OPEN: &str = "עדכון יומי: מלגות פתוחות";
pub const SUBJECT_NONE: &str = "עדכון יומי: אין מלגות פתוחות";

/// Which end of a date range to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePick {
    Start,
    End,
}

/// Parse a catalogue date value
///
/// Ranges written `a - b` yield `a` or `b` per `pick`. A time part after `T`
/// is dropped.
pub fn parse_date(value: &str, pick: DatePick) -> Option<NaiveDate> {
    let mut text = value.trim();
    if text.is_empty() {
        return None;
    }
    if text.contains(" - ") {
        let parts: Vec<&str> = text
            .split(" - ")
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        text = match pick {
            DatePick::Start => parts.first()?,
            DatePick::End => parts.last()?,
        };
    }
    if let Some((date, _)) = text.split_once('T') {
        text = date;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Date from the first field whose name contains one of the keys
///
/// Only that first field is consulted, even if it does not parse.
fn extract_date(scholarship: &Scholarship, keys: &[&str], pick: DatePick) -> Option<NaiveDate> {
    let keys: Vec<String> = keys.iter().map(|key| key.to_lowercase()).collect();
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    scholarship
        .find_field(&keys)
        .and_then(|value| parse_date(value, pick))
}

/// A scholarship open today
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenScholarship {
    pub id: String,
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
    pub open_date: NaiveDate,
    pub close_date: NaiveDate,
}

/// Catalogue entries with both dates known and `open <= today <= close`
pub fn open_scholarships(scholarships: &[Scholarship], today: NaiveDate) -> Vec<OpenScholarship> {
    scholarships
        .iter()
        .filter_map(|scholarship| {
            let open_date = extract_date(scholarship, OPEN_FIELD_NAMES, DatePick::Start)?;
            let close_date = extract_date(scholarship, CLOSE_FIELD_NAMES, DatePick::End)?;
            (open_date <= today && today <= close_date).then(|| OpenScholarship {
                id: scholarship.id.clone(),
                title: scholarship.title.clone(),
                url: scholarship.url.clone(),
                summary: scholarship.find_field(SUMMARY_FIELD_NAMES).map(str::to_string),
                open_date,
                close_date,
            })
        })
        .collect()
}

/// Minimal HTML escaping for text and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn non_empty(text: &str, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

fn render_card(item: &OpenScholarship) -> String {
    format!(
        concat!(
            "<div style=\"border:1px solid #e2e8f0;border-radius:14px;padding:16px;margin-bottom:12px;\">",
            "<div style=\"font-size:16px;font-weight:700;color:#0f172a;\">{title}</div>",
            "<div style=\"color:#475569;margin:6px 0 10px;\">{summary}</div>",
            "<div style=\"font-size:13px;color:#334155;\">נפתח ב: {open}</div>",
            "<div style=\"font-size:13px;color:#334155;\">נסגר ב: {close}</div>",
            "<a href=\"{url}\" style=\"display:inline-block;margin-top:12px;padding:10px 16px;",
            "background:#14b8a6;color:#ffffff;text-decoration:none;border-radius:999px;",
            "font-weight:600;\">להגשה עכשיו</a>",
            "</div>"
        ),
        title = escape_html(&non_empty(&item.title, "מלגה")),
        summary = escape_html(&non_empty(item.summary.as_deref().unwrap_or(""), "אין תיאור זמין")),
        open = format_date(item.open_date),
        close = format_date(item.close_date),
        url = escape_html(&non_empty(&item.url, "#")),
    )
}

/// Subject and HTML body of a digest email
pub fn build_digest_message(
    items: &[OpenScholarship],
    first_name: Option<&str>,
    is_test: bool,
) -> (String, String) {
    let subject = if items.is_empty() { SUBJECT_NONE } else { SUBJECT_OPEN };
    let subject = if is_test {
        format!("[TEST] {}", subject)
    } else {
        subject.to_string()
    };

    let greeting = first_name
        .filter(|name| !name.is_empty())
        .map(|name| format!("<p style=\"margin: 0 0 12px;\">היי {},</p>", escape_html(name)))
        .unwrap_or_default();

    let banner = if is_test {
        concat!(
            "<div style=\"background:#fee2e2;color:#991b1b;padding:8px 12px;",
            "border-radius:10px;font-size:12px;margin-bottom:12px;\">בדיקת מערכת</div>"
        )
    } else {
        ""
    };

    let body = if items.is_empty() {
        concat!(
            "<h2 style=\"margin:0 0 8px;color:#0f172a;\">אין מלגות פתוחות היום</h2>",
            "<p style=\"margin:0;color:#334155;\">נמשיך לבדוק עבורך ונעדכן מחר.</p>"
        )
        .to_string()
    } else {
        let cards: String = items.iter().map(render_card).collect();
        format!(
            concat!(
                "<h2 style=\"margin:0 0 8px;color:#0f172a;\">מצאנו עבורך מלגות פתוחות היום!</h2>",
                "<p style=\"margin:0 0 16px;color:#334155;\">",
                "אל תפספס/י, הזדמנות מעולה מחכה לך. כדאי להגיש עכשיו.</p>{}"
            ),
            cards
        )
    };

    let html = format!(
        concat!(
            "<div style=\"font-family: Assistant, Arial, sans-serif; direction: rtl;",
            "background-color:#f8fafc;padding:24px;\">",
            "<div style=\"max-width:640px;margin:0 auto;background:#ffffff;",
            "border-radius:18px;padding:24px;border:1px solid #e2e8f0;\">",
            "{}{}{}</div></div>"
        ),
        banner, greeting, body
    );

    (subject, html)
}

/// Why a run did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BeforeWindow,
    AlreadyRan,
    DataError,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::BeforeWindow => "before_window",
            SkipReason::AlreadyRan => "already_ran",
            SkipReason::DataError => "data_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DigestOutcome {
    Skipped { skipped: bool, reason: SkipReason },
    Completed { skipped: bool, open_count: usize },
}

impl DigestOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        DigestOutcome::Skipped {
            skipped: true,
            reason,
        }
    }

    pub fn completed(open_count: usize) -> Self {
        DigestOutcome::Completed {
            skipped: false,
            open_count,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, DigestOutcome::Skipped { .. })
    }
}

/// Runs the daily digest
#[derive(Clone)]
pub struct DigestService {
    source: Arc<dyn ScholarshipSource>,
    notifier: Arc<dyn Notifier>,
    users: UserRepository,
    scholarships: UserScholarshipRepository,
    job_runs: JobRunRepository,
    schedule: DailySchedule,
    admin_email: Option<String>,
    test_email: String,
}

impl DigestService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn ScholarshipSource>,
        notifier: Arc<dyn Notifier>,
        users: UserRepository,
        scholarships: UserScholarshipRepository,
        job_runs: JobRunRepository,
        schedule: DailySchedule,
        admin_email: Option<String>,
        test_email: String,
    ) -> Self {
        if admin_email.is_none() {
            tracing::warn!("ADMIN_EMAIL is not set; admin notifications will be skipped");
        }
        Self {
            source,
            notifier,
            users,
            scholarships,
            job_runs,
            schedule,
            admin_email,
            test_email,
        }
    }

    /// Run against the current clock
    pub async fn run(&self, force: bool, is_test: bool) -> Result<DigestOutcome, DigestError> {
        self.run_at(Utc::now(), force, is_test).await
    }

    /// Run as if the clock read `now`
    ///
    /// Without `force` the run is skipped before today's window and when it
    /// already ran today. Test runs send a single message to the admin and do
    /// not record the run.
    #[instrument(skip(self), fields(force = force, is_test = is_test))]
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        force: bool,
        is_test: bool,
    ) -> Result<DigestOutcome, DigestError> {
        let today = self.schedule.local_date(now);

        if !force && !self.schedule.window_open(now) {
            return Ok(self.finish(DigestOutcome::skipped(SkipReason::BeforeWindow)));
        }
        if !force && self.job_runs.last_run_date(JOB_NAME).await? == Some(today) {
            return Ok(self.finish(DigestOutcome::skipped(SkipReason::AlreadyRan)));
        }

        let scholarships = match self.source.fetch_scholarships().await {
            Ok(scholarships) => scholarships,
            Err(e) => {
                tracing::error!(error = %e, "Digest skipped: catalogue unavailable");
                return Ok(self.finish(DigestOutcome::skipped(SkipReason::DataError)));
            }
        };
        let items = open_scholarships(&scholarships, today);

        if items.is_empty() || is_test {
            self.send_to_admin(&items, is_test).await;
        } else {
            self.send_to_interested_users(&items).await?;
        }

        if !is_test {
            self.job_runs.mark_ran(JOB_NAME, today).await?;
        }

        tracing::info!(open_count = items.len(), date = %today, "Digest run completed");
        Ok(self.finish(DigestOutcome::completed(items.len())))
    }

    fn finish(&self, outcome: DigestOutcome) -> DigestOutcome {
        let label = match &outcome {
            DigestOutcome::Skipped { reason, .. } => {
                tracing::info!(reason = reason.as_str(), "Digest skipped");
                reason.as_str()
            }
            DigestOutcome::Completed { .. } => "sent",
        };
        telemetry::record_digest_run(label);
        outcome
    }

    async fn send_to_admin(&self, items: &[OpenScholarship], is_test: bool) {
        let Some(admin_email) = self.admin_email.as_deref() else {
            tracing::warn!("Skipping admin digest email because ADMIN_EMAIL is missing");
            return;
        };
        let (subject, html) = build_digest_message(items, None, is_test);
        self.deliver(admin_email, subject, html, is_test).await;
    }

    async fn send_to_interested_users(&self, items: &[OpenScholarship]) -> Result<(), DigestError> {
        let user_ids = self
            .scholarships
            .user_ids_with_status(&ScholarshipStatus::INTERESTED)
            .await?;
        if user_ids.is_empty() {
            tracing::info!("Digest skipped: no interested users");
            return Ok(());
        }

        let users = self.users.find_by_ids(&user_ids).await?;
        for user in &users {
            let (subject, html) = build_digest_message(items, Some(&user.first_name), false);
            self.deliver(&user.email, subject, html, false).await;
        }
        tracing::info!(recipients = users.len(), "Digest emails dispatched");
        Ok(())
    }

    /// Build and send one message; failures are logged, never propagated
    async fn deliver(&self, email: &str, subject: String, html: String, is_test: bool) {
        let payload = match MakePayload::build(
            email,
            MakeEvent::ScholarshipsDailyUpdate,
            html,
            subject,
            is_test,
            &self.test_email,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Invalid digest payload");
                return;
            }
        };
        if let Err(e) = self.notifier.notify(&payload).await {
            tracing::error!(error = %e, "Digest delivery failed");
        }
    }
}
