//! Local store keys and the remote collection name.
//!
//! Keys carry a version suffix; bump it when the stored shape changes.

/// Completion records (`CompletionRecord` as JSON).
pub const DATA_KEY: &str = "habit_tracker_data_v2";
/// Habit list (`Vec<Habit>` as JSON).
pub const CONFIG_KEY: &str = "habit_tracker_config_v2";
/// Theme preference, `"light"` or `"dark"`.
pub const THEME_KEY: &str = "habit_tracker_theme";

pub const SYNC_ID_KEY: &str = "habit_tracker_cloud_sync_id_v1";
/// Present with value `"1"` while sync is enabled.
pub const SYNC_ENABLED_KEY: &str = "habit_tracker_cloud_sync_enabled_v1";
pub const CLIENT_ID_KEY: &str = "habit_tracker_cloud_client_id_v1";

/// Remote collection holding one document per sync id.
pub const SYNC_COLLECTION: &str = "habit_tracker_sync_v1";
