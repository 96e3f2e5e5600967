//! 工具层：Tool trait、注册表与带超时的执行器（具体工具由宿主注册）

pub mod executor;
pub mod registry;

pub use executor::{ToolError, ToolExecutor};
pub use registry::{Tool, ToolRegistry, ToolSpec};
