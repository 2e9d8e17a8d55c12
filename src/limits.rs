//! Hard limits on caller-supplied input.

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 4;
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Bookings a single email may hold at once.
pub const MAX_BOOKINGS_PER_EMAIL: usize = 50;

/// Rows accepted from one legacy export file.
pub const MAX_LEGACY_ROWS: usize = 100_000;
