pub mod capacity;
pub mod entities;
pub mod naming;
pub mod report;
pub mod repositories;
pub mod services;
pub mod state;
pub mod tags;

pub use capacity::*;
pub use entities::*;
pub use host_ledger_core::{LedgerError, LedgerResult};
pub use naming::normalize_host_name;
pub use report::*;
pub use repositories::*;
pub use services::*;
pub use tags::*;
