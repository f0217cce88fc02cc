/// Sheet numbers within a sizing request are PostgreSQL INTEGER.
pub type SheetId = i32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
