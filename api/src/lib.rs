// Web layer: axum router, session cookies and server-rendered pages

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod templates;

pub use routes::create_router;
pub use state::AppState;
