/// Longest single reservation, in one-hour slots.
pub const MAX_BOOKING_HOURS: u8 = 24;

/// Widest rolling window a deployment may configure.
pub const MAX_WINDOW_DAYS: u32 = 62;

/// Longest tournament block, in calendar days.
pub const MAX_BLOCK_DAYS: i64 = 366;

pub const MAX_SPORT_NAME_LEN: usize = 64;
pub const MAX_SPORTS_PER_VENUE: usize = 32;
pub const MAX_COURTS_PER_VENUE: usize = 128;
pub const MAX_TOURNAMENT_NAME_LEN: usize = 256;

/// Offsets outside ±14h are not real civil time zones.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;
