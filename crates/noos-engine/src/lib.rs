#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![allow(clippy::module_name_repetitions)]
#![forbid(unsafe_code)]

pub mod config;
pub mod entities;
pub mod error;
pub mod service;

pub use config::{CONFIG, EngineConfig};
pub use entities::{
    AlgorithmParameters, NoosLabel, NoosResult, Sales, Sku, Store, Style, Task, TaskCategory,
    TaskStatus, TaskType,
};
pub use error::{EngineError, EngineResult, ErrorKind};

pub use async_trait;
pub use tokio;
pub use tokio_util::sync::CancellationToken;
pub use tracing;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
