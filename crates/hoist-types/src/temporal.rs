use chrono::Utc;

/// Wall-clock milliseconds since the UNIX epoch.
///
/// All `createdTime`, `uploadTime` and `expires` fields use this unit.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
