mod session;

pub use session::load_viewer;
