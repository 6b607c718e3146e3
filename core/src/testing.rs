pub mod monitor;
pub mod result;
pub mod sampler;
pub mod signal;
pub mod testcase;
pub mod verdict;

pub use monitor::*;
pub use result::*;
pub use sampler::*;
pub use signal::*;
pub use testcase::*;
pub use verdict::*;
