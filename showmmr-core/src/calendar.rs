use chrono::{DateTime, Local, TimeZone, Utc};

/// Party-queue ratings did not exist before 2019-08-06T00:00:00Z.
pub const PARTY_MMR_REMOVAL_EPOCH: u32 = 1_565_049_600;

/// Start of the Crownfall event, 2024-04-19T00:00:00Z.
pub const CROWNFALL_EPOCH: u32 = 1_713_484_800;

/// Format used for the human-readable `Date` ledger column.
pub const LOCAL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert unix seconds into a UTC timestamp.
pub fn utc_time(unix_seconds: u32) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(i64::from(unix_seconds), 0).unwrap_or_default()
}

/// Convert unix seconds into the caller's civil time in `tz`.
pub fn local_time<Tz: TimeZone>(unix_seconds: u32, tz: &Tz) -> DateTime<Tz> {
    utc_time(unix_seconds).with_timezone(tz)
}

/// Render unix seconds in the machine's local time zone.
pub fn format_local(unix_seconds: u32) -> String {
    local_time(unix_seconds, &Local)
        .format(LOCAL_DATE_FORMAT)
        .to_string()
}
