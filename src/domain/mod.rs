//! Domain modules organized as vertical slices.
//!
//! - `price_history`: bars, wire types, conversions, the per-ticker store
//! - `watchlist`: the subscription set and the combined watch state

pub mod price_history;
pub mod watchlist;
