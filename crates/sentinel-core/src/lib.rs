pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod load;
pub mod metrics;
pub mod probe;
pub mod sampler;
pub mod stats;
pub mod ticker;

pub use client::*;
pub use config::*;
pub use error::*;
pub use history::*;
pub use load::*;
pub use metrics::*;
pub use probe::*;
pub use sampler::*;
pub use stats::*;
pub use ticker::*;
