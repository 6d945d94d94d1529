// Questionnaire to scholarship keyword matching

use crate::db::repositories::{QuestionnaireRepository, UserScholarshipRepository};
use crate::errors::{DatabaseError, NotionError};
use crate::models::{QuestionnaireAnswers, ScoredMatch};
use crate::notion::{RawPage, ScholarshipSource};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

pub const DEFAULT_LIMIT: usize = 15;
pub const DEFAULT_THRESHOLD: i64 = 3;
/// Below this many threshold hits the best `limit` are taken regardless
const MIN_FILTERED: usize = 5;

pub const REASON_STUDY_STATUS: &str = "התאמה לסטטוס הלימודים שלך";
pub const REASON_STUDY_FIELD: &str = "התאמה לתחום הלימודים שלך";
pub const REASON_MILITARY: &str = "התאמה לסטטוס השירות שלך";
pub const REASON_POPULATIONS: &str = "מתאים לאוכלוסיות שסימנת";
pub const REASON_VOLUNTEERING: &str = "דורש התנדבות בזמן שבחרת שלא להתנדב";
pub const REASON_ONE_TIME: &str = "מתאים להעדפת מלגה חד-פעמית";
pub const REASON_ANNUAL: &str = "מתאים להעדפת מלגה שנתית/מתמשכת";
pub const REASON_MULTI_YEAR: &str = "מתאים להעדפת מלגה רב-שנתית";
pub const REASON_GENERAL: &str = "התאמה כללית לפי הנתונים שמילאת";

/// Keywords searched for in a scholarship's text, per questionnaire answer
const KEYWORD_MAP: &[(&str, &[&str])] = &[
    ("מכינה", &["מכינה"]),
    ("תואר ראשון", &["תואר ראשון", "בוגר", "undergraduate"]),
    ("תואר שני", &["תואר שני", "תואר מתקדם", "graduate", "master"]),
    ("הנדסאי", &["הנדסאי"]),
    (
        "הנדסה / מדעים מדויקים",
        &["הנדסה", "מדעים מדויקים", "הנדסי", "פיזיקה", "כימיה", "מתמטיקה"],
    ),
    (
        "מדעי החברה / כלכלה / ניהול",
        &["מדעי החברה", "כלכלה", "ניהול", "מנהל עסקים"],
    ),
    ("חינוך / מדעי הרוח", &["חינוך", "מדעי הרוח", "היסטוריה", "ספרות"]),
    ("רפואה / מקצועות הבריאות", &["רפואה", "סיעוד", "בריאות", "פרא רפואי"]),
    ("לפני שירות", &["לפני שירות"]),
    ("במהלך שירות", &["במהלך שירות", "חיילים", "בצה"]),
    ("חייל משוחרר", &["משוחרר", "חייל משוחרר"]),
    ("שירות לאומי / אזרחי", &["שירות לאומי", "אזרחי"]),
    ("תושב פריפריה", &["פריפריה"]),
    ("עולה חדש", &["עולה חדש"]),
    ("יוצא אתיופיה", &["אתיופ"]),
    ("חרדי", &["חרדי"]),
    ("ערבי / דרוזי", &["ערבי", "דרוזי"]),
    ("נכות מוכרת", &["נכות", "מוגבל"]),
];

const ONE_TIME_KEYWORDS: &[&str] = &["חד פעמי", "חד-פעמי", "מענק", "one-time"];
const ANNUAL_KEYWORDS: &[&str] = &["שנתי", "annual", "מתמשכת"];
const MULTI_YEAR_KEYWORDS: &[&str] = &["רב שנתי", "רב-שנתי", "multi-year"];

fn keywords_for(answer: &str) -> Option<&'static [&'static str]> {
    KEYWORD_MAP
        .iter()
        .find(|(key, _)| *key == answer)
        .map(|(_, keywords)| *keywords)
}

/// `blob` must already be lowercased
fn contains_any(blob: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|keyword| blob.contains(&keyword.to_lowercase()))
}

fn answer_matches(answer: &str, blob: &str) -> bool {
    keywords_for(answer).is_some_and(|keywords| contains_any(blob, keywords))
}

/// Score one scholarship text against the answers
///
/// `blob` is lowercased here; reasons come back in scoring order and are never
/// empty.
pub fn score_scholarship(answers: &QuestionnaireAnswers, blob: &str) -> (i64, Vec<String>) {
    let blob = blob.to_lowercase();
    let mut score = 0;
    let mut reasons = Vec::new();

    for (answer, reason) in [
        (&answers.study_status, REASON_STUDY_STATUS),
        (&answers.study_field, REASON_STUDY_FIELD),
        (&answers.military_status, REASON_MILITARY),
    ] {
        if answer_matches(answer, &blob) {
            score += 2;
            reasons.push(reason.to_string());
        }
    }

    let population_hits = answers
        .populations
        .iter()
        .filter(|population| answer_matches(population, &blob))
        .count() as i64;
    if population_hits > 0 {
        score += population_hits;
        reasons.push(REASON_POPULATIONS.to_string());
    }

    if answers.volunteer_willingness == "לא" && blob.contains("התנדבות") {
        score -= 2;
        reasons.push(REASON_VOLUNTEERING.to_string());
    }

    let duration = match answers.scholarship_duration_preference.as_str() {
        "חד-פעמית" => Some((ONE_TIME_KEYWORDS, REASON_ONE_TIME)),
        "שנתית" => Some((ANNUAL_KEYWORDS, REASON_ANNUAL)),
        "רב-שנתית" => Some((MULTI_YEAR_KEYWORDS, REASON_MULTI_YEAR)),
        _ => None,
    };
    if let Some((keywords, reason)) = duration {
        if contains_any(&blob, keywords) {
            score += 2;
            reasons.push(reason.to_string());
        }
    }

    if reasons.is_empty() {
        reasons.push(REASON_GENERAL.to_string());
    }

    (score, reasons)
}

/// Score every page and pick the ones worth tracking
///
/// Sorting is stable, so equal scores keep catalogue order. When fewer than
/// five pages reach `threshold`, the top `limit` are returned regardless.
pub fn compute_matches(
    answers: &QuestionnaireAnswers,
    pages: &[RawPage],
    limit: usize,
    threshold: i64,
) -> Vec<ScoredMatch> {
    let mut scored: Vec<ScoredMatch> = pages
        .iter()
        .map(|page| {
            let (score, reasons) = score_scholarship(answers, &page.blob);
            ScoredMatch {
                key: page.id.clone(),
                title: page.title.clone(),
                link: Some(page.url.clone()).filter(|url| !url.is_empty()),
                score,
                reasons,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));

    let above = scored.iter().filter(|m| m.score >= threshold).count();
    if above < MIN_FILTERED {
        scored.truncate(limit);
        scored
    } else {
        scored
            .into_iter()
            .filter(|m| m.score >= threshold)
            .take(limit)
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("No questionnaire on file")]
    NoQuestionnaire,

    #[error(transparent)]
    Notion(#[from] NotionError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Recomputes and stores a user's matches
#[derive(Clone)]
pub struct MatchService {
    source: Arc<dyn ScholarshipSource>,
    questionnaires: QuestionnaireRepository,
    scholarships: UserScholarshipRepository,
}

impl MatchService {
    pub fn new(
        source: Arc<dyn ScholarshipSource>,
        questionnaires: QuestionnaireRepository,
        scholarships: UserScholarshipRepository,
    ) -> Self {
        Self {
            source,
            questionnaires,
            scholarships,
        }
    }

    /// Fetch the catalogue, score it against the user's questionnaire and upsert
    ///
    /// Returns the number of matches stored.
    #[instrument(skip(self))]
    pub async fn refresh(&self, user_id: i64) -> Result<usize, MatchError> {
        let questionnaire = self
            .questionnaires
            .find_by_user(user_id)
            .await?
            .ok_or(MatchError::NoQuestionnaire)?;
        let pages = self.source.fetch_pages_raw().await?;
        let matches = compute_matches(
            &questionnaire.answers,
            &pages,
            DEFAULT_LIMIT,
            DEFAULT_THRESHOLD,
        );
        let stored = self.scholarships.upsert_matches(user_id, &matches).await?;
        tracing::info!(
            user_id = user_id,
            pages = pages.len(),
            stored = stored,
            "Matches refreshed"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::Requirements;

    fn answers() -> QuestionnaireAnswers {
        QuestionnaireAnswers {
            study_status: "תואר ראשון".to_string(),
            study_field: "הנדסה / מדעים מדויקים".to_string(),
            institution: "הטכניון".to_string(),
            military_status: "חייל משוחרר".to_string(),
            populations: vec!["תושב פריפריה".to_string(), "עולה חדש".to_string()],
            work_status: "לא עובד".to_string(),
            volunteer_willingness: "לא".to_string(),
            scholarship_duration_preference: "שנתית".to_string(),
        }
    }

    fn page(id: &str, blob: &str) -> RawPage {
        RawPage {
            id: id.to_string(),
            title: format!("מלגה {}", id),
            url: String::new(),
            blob: blob.to_string(),
            requirements: Requirements::default(),
        }
    }

    #[test]
    fn test_full_match_scores_every_rule() {
        let (score, reasons) = score_scholarship(
            &answers(),
            "מלגה שנתית לסטודנטים לתואר ראשון בהנדסה, חיילים משוחררים, תושבי פריפריה ועולה חדש",
        );
        assert_eq!(score, 2 + 2 + 2 + 2 + 2);
        assert_eq!(
            reasons,
            vec![
                REASON_STUDY_STATUS,
                REASON_STUDY_FIELD,
                REASON_MILITARY,
                REASON_POPULATIONS,
                REASON_ANNUAL
            ]
        );
    }

    #[test]
    fn test_volunteering_penalty() {
        let (score, reasons) = score_scholarship(&answers(), "מלגה בתמורה להתנדבות בקהילה");
        assert_eq!(score, -2);
        assert_eq!(reasons, vec![REASON_VOLUNTEERING]);
    }

    #[test]
    fn test_english_keywords_are_case_insensitive() {
        let mut a = answers();
        a.study_status = "תואר שני".to_string();
        let (score, _) = score_scholarship(&a, "Scholarship for Master students");
        assert_eq!(score, 2);
    }

    #[test]
    fn test_no_hit_gives_general_reason() {
        let (score, reasons) = score_scholarship(&answers(), "מלגת ספורט");
        assert_eq!(score, 0);
        assert_eq!(reasons, vec![REASON_GENERAL]);
    }

    #[test]
    fn test_few_threshold_hits_take_top_limit() {
        let pages = vec![page("a", "ספורט"), page("b", "תואר ראשון הנדסה"), page("c", "אמנות")];
        let matches = compute_matches(&answers(), &pages, 2, 3);
        let keys: Vec<&str> = matches.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_many_threshold_hits_are_filtered() {
        let mut pages: Vec<RawPage> = (0..6)
            .map(|i| page(&format!("hit{}", i), "תואר ראשון הנדסה"))
            .collect();
        pages.push(page("miss", "ספורט"));
        let matches = compute_matches(&answers(), &pages, 15, 3);
        assert_eq!(matches.len(), 6);
        assert!(matches.iter().all(|m| m.score >= 3));
    }

    #[test]
    fn test_empty_link_becomes_none() {
        let matches = compute_matches(&answers(), &[page("a", "x")], 15, 3);
        assert_eq!(matches[0].link, None);
    }
}
