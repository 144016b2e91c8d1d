//! Data-producing and data-shaping node executors: Manual, HTTP, Set,
//! Split, Code and Wait.

pub mod code;
pub(crate) mod helpers;
pub mod http;
pub mod manual;
pub mod set;
pub mod split;
pub mod wait;

pub use code::CodeNodeExecutor;
pub use http::HttpNodeExecutor;
pub use manual::ManualNodeExecutor;
pub use set::SetNodeExecutor;
pub use split::SplitNodeExecutor;
pub use wait::WaitNodeExecutor;
