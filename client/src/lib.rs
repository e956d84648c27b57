pub mod api;
pub mod prefs;

pub use api::{ApiClient, ApiError};
pub use prefs::{DashboardPrefs, PrefsError, PrefsStore};
