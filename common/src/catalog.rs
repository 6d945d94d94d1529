// Catalogue presentation: eligibility filtering and card images

use crate::models::QuestionnaireAnswers;
use crate::notion::{Requirements, Scholarship};
use serde::Serialize;
use std::path::Path;

/// Military statuses that satisfy a service requirement
pub const SERVED_STATUSES: [&str; 3] = ["במהלך שירות", "חייל משוחרר", "שירות לאומי / אזרחי"];

const NO_VOLUNTEERING: &str = "לא";

const IMAGE_KEYWORDS: &[(&[&str], &str)] = &[
    (&["atidim", "עתידים"], "01_atidim_scholarship.jpg"),
    (&["milgafo", "מלגפו"], "02_milgafo.jpg"),
    (&["periphery", "פריפריה"], "03_periphery_scholarship_keren_haim_meshulrarim.jpg"),
    (&["sapir", "peace", "שלום", "ספיר"], "04_sapir_peace_leadership.jpg"),
    (&["lenovo", "לנובו"], "05_lenovo_scholarship.jpg"),
    (&["memadim", "ממדים"], "06_memadim_lelimudim.jpg"),
    (&["civic", "liberal", "אזרחי"], "07_civic_liberal_scholarship.jpg"),
    (&["ministry", "education", "משרד החינוך", "milga go"], "08_milga_go_ministry_of_education.jpg"),
    (&["noar", "latet", "נוער לתת"], "09_noar_latet.jpg"),
    (&["gross", "foundation", "גרוס"], "10_gross_foundation.jpg"),
];

pub fn has_served(military_status: &str) -> bool {
    SERVED_STATUSES.contains(&military_status)
}

/// Unknown requirements or a missing questionnaire never exclude a scholarship
pub fn is_eligible(
    requirements: Option<&Requirements>,
    answers: Option<&QuestionnaireAnswers>,
) -> bool {
    let (Some(requirements), Some(answers)) = (requirements, answers) else {
        return true;
    };
    if requirements.volunteering == Some(true) && answers.volunteer_willingness == NO_VOLUNTEERING {
        return false;
    }
    if requirements.military == Some(true) && !has_served(&answers.military_status) {
        return false;
    }
    true
}

/// Display band for a match score
pub fn match_level(score: i64) -> &'static str {
    match score {
        s if s >= 6 => "high",
        s if s >= 3 => "medium",
        _ => "low",
    }
}

/// Image files available for catalogue cards
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    files: Vec<String>,
}

impl ImageCatalog {
    pub fn new(mut files: Vec<String>) -> Self {
        files.sort();
        Self { files }
    }

    /// Sorted file names in `dir`; a missing directory yields an empty catalogue
    pub fn from_dir(dir: &Path) -> Self {
        let files = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|entry| entry.path().is_file())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_else(|e| {
                tracing::debug!(dir = %dir.display(), error = %e, "No scholarship images");
                Vec::new()
            });
        Self::new(files)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Keyword match on the title first, then a rotation through the directory
    pub fn resolve(&self, title: &str, index: usize) -> Option<String> {
        let title = title.to_lowercase();
        IMAGE_KEYWORDS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| title.contains(k)))
            .map(|(_, file)| file.to_string())
            .or_else(|| {
                (!self.files.is_empty()).then(|| self.files[index % self.files.len()].clone())
            })
    }
}

/// A scholarship card with its image path relative to the static root
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub scholarship: Scholarship,
    pub image: Option<String>,
}

/// Eligible scholarships in source order, each with an image
pub fn build_catalog(
    scholarships: Vec<Scholarship>,
    answers: Option<&QuestionnaireAnswers>,
    images: &ImageCatalog,
) -> Vec<CatalogEntry> {
    scholarships
        .into_iter()
        .filter(|s| is_eligible(Some(&s.requirements), answers))
        .enumerate()
        .map(|(index, scholarship)| {
            let image = images
                .resolve(&scholarship.title, index)
                .map(|file| format!("scholarship_images/{}", file));
            CatalogEntry { scholarship, image }
        })
        .collect()
}
