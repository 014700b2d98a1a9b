//! Stock availability: merging warehouse quantities and gating purchases on them.
pub mod aggregator;
pub mod gate;
pub mod session;

pub use aggregator::{FetchTicket, MapKind, QuantityMap, StockAggregator};
pub use gate::AvailabilityGate;
pub use session::{AvailabilitySession, RefreshReport, StockSource};
