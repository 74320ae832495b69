//! Translation exchange: bulk CSV/JSON export and import of translatable
//! fields.

pub mod codec;
pub mod row;
pub mod service;

pub use codec::{ExchangeCodec, ExchangeFormat};
pub use row::{
    compute_source_hash, ExchangeResult, ExchangeRow, ExchangeSummary, RowConflict, RowError,
    RowResult, RowStatus, EXCHANGE_COLUMNS, REQUIRED_COLUMNS,
};
pub use service::{ApplyOptions, ExchangeService, ExportFilter, ExportResult};
