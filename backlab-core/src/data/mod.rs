//! Price data: providers, validated history, universes, synthetic series.

pub mod csv_provider;
pub mod history;
pub mod provider;
pub mod synthetic;
pub mod universe;

pub use csv_provider::CsvDirProvider;
pub use history::{HistoryView, PriceHistory};
pub use provider::{InMemoryProvider, PriceError, PriceProvider, PriceRow};
pub use synthetic::{synthetic_series, synthetic_series_with, SyntheticSpec};
pub use universe::{Instrument, Universe};
