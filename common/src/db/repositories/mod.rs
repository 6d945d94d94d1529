// Repository layer for database operations

pub mod inquiry;
pub mod job_run;
pub mod login_attempt;
pub mod notification;
pub mod queries;
pub mod questionnaire;
pub mod scholarship_event;
pub mod submission;
pub mod user;
pub mod user_scholarship;

pub use inquiry::InquiryRepository;
pub use job_run::JobRunRepository;
pub use login_attempt::LoginAttemptRepository;
pub use notification::NotificationRepository;
pub use questionnaire::QuestionnaireRepository;
pub use scholarship_event::ScholarshipEventRepository;
pub use submission::SubmissionRepository;
pub use user::UserRepository;
pub use user_scholarship::UserScholarshipRepository;
