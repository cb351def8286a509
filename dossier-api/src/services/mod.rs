//! Service Layer
//!
//! Business logic between the HTTP routes and the record store:
//! - `orchestrator`: cache-or-provider decisions for every read endpoint
//! - `reconciler`: matching inbound callbacks to the requests they answer
//! - `detail_fetcher`: the secondary fetch that finalizes negative-event checks

mod detail_fetcher;
mod orchestrator;
mod reconciler;

pub use detail_fetcher::*;
pub use orchestrator::*;
pub use reconciler::*;
