use serde::{Deserialize, Serialize};

use crate::{calendar::Granularity, filter::Filters};

/// User preferences, persisted apart from the task collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub is_dark_mode: bool,
    pub current_filters: Filters,
    pub current_view: Granularity,
}
