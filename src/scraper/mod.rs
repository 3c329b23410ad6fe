//! Site-agnostic crawl building blocks, leaf to root: waiting and retrying,
//! text cleanup, field extraction, card harvesting, keyword search,
//! pagination and detail-page visits. [`crate::pipeline`] composes them.

pub mod cards;
pub mod cleaner;
pub mod detail;
pub mod fields;
pub mod pagination;
pub mod retry;
pub mod search;
pub mod wait;

pub use self::cards::{CardError, CardHarvester};
pub use self::detail::{DetailOutcome, DetailVisitor};
pub use self::pagination::{AdvanceOutcome, ExhaustReason, PageState, PaginationController};
pub use self::search::{SearchDriver, SearchOutcome};
