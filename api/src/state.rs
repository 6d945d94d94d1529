use std::path::PathBuf;
use std::sync::Arc;

use common::analytics::AnalyticsService;
use common::bootstrap;
use common::auth::{AuthService, JwtService};
use common::catalog::ImageCatalog;
use common::config::Settings;
use common::db::repositories::{
    InquiryRepository, LoginAttemptRepository, NotificationRepository, QuestionnaireRepository,
    ScholarshipEventRepository, SubmissionRepository, UserRepository, UserScholarshipRepository,
};
use common::db::DbPool;
use common::digest::DigestService;
use common::make::Notifier;
use common::matching::MatchService;
use common::notion::ScholarshipSource;
use metrics_exporter_prometheus::PrometheusHandle;
use tera::Tera;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub config: Arc<Settings>,
    pub templates: Arc<Tera>,
    pub source: Arc<dyn ScholarshipSource>,
    pub notifier: Arc<dyn Notifier>,
    pub auth: AuthService,
    pub users: UserRepository,
    pub inquiries: InquiryRepository,
    pub submissions: SubmissionRepository,
    pub questionnaires: QuestionnaireRepository,
    pub scholarships: UserScholarshipRepository,
    pub notifications: NotificationRepository,
    pub events: ScholarshipEventRepository,
    pub matches: MatchService,
    pub digest: DigestService,
    pub analytics: AnalyticsService,
    pub images: Arc<ImageCatalog>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(
        config: Settings,
        db_pool: DbPool,
        templates: Tera,
        source: Arc<dyn ScholarshipSource>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let users = UserRepository::new(db_pool.clone());
        let scholarships = UserScholarshipRepository::new(db_pool.clone());
        let questionnaires = QuestionnaireRepository::new(db_pool.clone());
        let events = ScholarshipEventRepository::new(db_pool.clone());

        let jwt = JwtService::new(&config.server.secret_key, config.auth.session_hours);
        let auth = AuthService::new(
            jwt,
            users.clone(),
            LoginAttemptRepository::new(db_pool.clone()),
            &config.auth,
        );

        let digest =
            bootstrap::build_digest_service(&config, &db_pool, source.clone(), notifier.clone())?;

        let images = ImageCatalog::from_dir(
            &PathBuf::from(&config.server.static_dir).join("scholarship_images"),
        );

        Ok(Self {
            matches: MatchService::new(
                source.clone(),
                questionnaires.clone(),
                scholarships.clone(),
            ),
            analytics: AnalyticsService::new(events.clone(), scholarships.clone()),
            inquiries: InquiryRepository::new(db_pool.clone()),
            submissions: SubmissionRepository::new(db_pool.clone()),
            notifications: NotificationRepository::new(db_pool.clone()),
            config: Arc::new(config),
            templates: Arc::new(templates),
            images: Arc::new(images),
            metrics: None,
            db_pool,
            source,
            notifier,
            auth,
            users,
            questionnaires,
            scholarships,
            events,
            digest,
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn admin_email(&self) -> Option<String> {
        self.config.admin.normalized_email()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.server.static_dir).join("uploads").join("profile")
    }
}
