//! Weather assessment core: caching, risk classification, fallback and
//! response assembly for the disaster-alert backend.

pub mod assembler;
pub mod cache;
pub mod error;
pub mod risk;
pub mod scenario;
pub mod service;
pub mod store;

pub use assembler::{DataSource, FetchOutcome, ResponseAssembler, ResponsePayload};
pub use cache::{CachedWeather, TtlCache, WeatherCache};
pub use error::{ErrorBody, ServiceError};
pub use risk::RiskEngine;
pub use scenario::Scenario;
pub use service::WeatherService;
pub use store::{HistoryStore, MemoryHistoryStore, MemoryStaleStore, StaleRecord, StaleStore};
