pub mod clock;
pub mod config;
pub mod error;
pub mod rng;
pub mod types;
pub mod validate;

pub use clock::{Clock, SystemClock};
pub use config::UpliftConfig;
pub use error::{UpliftError, UpliftResult};
pub use rng::SharedRng;
