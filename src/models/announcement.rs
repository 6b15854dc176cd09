//! Announcement shown on the ladder's landing page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub title: String,
    pub date: String,
    pub content: String,
    /// User id of the admin who last edited it.
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Announcement {
    fn default() -> Self {
        Self {
            title: "Online Ladder System: Doubles Ladder".to_string(),
            date: String::new(),
            content: "Sign up before the weekly deadline. Players are grouped by ladder ranking \
                      and play with each partner in their group."
                .to_string(),
            updated_by: None,
            updated_at: Utc::now(),
        }
    }
}
