pub mod clock;
pub mod gauge;
pub mod ticker;

pub use clock::{Clock, SystemClock, TestClock};
pub use gauge::RateGauge;
pub use ticker::TimeTicker;
