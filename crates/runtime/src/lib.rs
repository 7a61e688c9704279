pub mod budget;
pub mod metrics;
pub mod work_queue;

pub use budget::*;
pub use metrics::*;
pub use work_queue::*;
