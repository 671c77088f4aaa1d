pub mod kalshi;
pub mod polymarket;

/// Upper bound on pages per fetch, so a misbehaving cursor cannot loop forever.
pub const MAX_PAGES: usize = 200;

pub const PAGE_LIMIT: usize = 100;

/// Descriptions are cut here before reaching the dispatcher.
pub const DESCRIPTION_CAP: usize = 500;
