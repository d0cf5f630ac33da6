pub mod aggregator;
pub mod window;

pub use aggregator::{
    aggregate_events, aggregate_fills, compute_pnl, EventReport, FillReport, Pnl, SymbolVolume,
};
pub use window::{utc_offset, ReportWindow};
