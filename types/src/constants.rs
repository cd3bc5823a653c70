/// Payout (in points) for every winning unit of quantity.
pub const PAYOUT_RATE: u64 = 180;

/// Winners required per series (one per prefix).
pub const WINNERS_PER_SERIES: usize = 10;

/// Number of entries in a complete draw result.
pub const RESULT_LEN: usize = 30;

/// Purchased volume (units) above which purchased numbers may be reused as filler.
pub const ALLOW_REPEATS_THRESHOLD: u64 = 1_000;

/// Share of the budget (percent) a single number's liability may reach before it is
/// removed from selection.
pub const PRESCREEN_PERCENT: u64 = 80;

/// Lower and upper targets (percent of the budget) for the lowest-winning strategy.
pub const LOWEST_WINNING_MIN_PERCENT: u64 = 30;
pub const LOWEST_WINNING_MAX_PERCENT: u64 = 40;

/// Per-entry seller ceiling multipliers (relaxed and tightened).
pub const SELLER_CEILING_RELAXED: u64 = 2;
pub const SELLER_CEILING_STRICT: u64 = 1;

/// First and last draw hour of the business day (local time, 24h clock).
pub const FIRST_DRAW_HOUR: u32 = 9;
pub const LAST_DRAW_HOUR: u32 = 23;

/// Minutes between consecutive draws.
pub const SLOT_MINUTES: u32 = 15;

/// Number of draw slots in a business day (09:00 AM through 11:45 PM).
pub const SLOTS_PER_DAY: usize = ((LAST_DRAW_HOUR - FIRST_DRAW_HOUR + 1) * 60 / SLOT_MINUTES) as usize;

/// Default local offset (minutes east of UTC) for the business day: Asia/Kolkata.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;
