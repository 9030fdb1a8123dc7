pub mod config;
pub mod error;
pub mod frame;
pub mod hashing;
pub mod metrics;
pub mod seeding;
pub mod timeout;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use frame::CuratedFrame;
pub use metrics::*;
pub use seeding::derive_seed;
pub use timeout::with_timeout;
pub use traits::*;
pub use types::*;
