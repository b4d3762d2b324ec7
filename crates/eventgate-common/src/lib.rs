//! EventGate Common - 跨模块共享工具与数据结构
//!
//! 该模块提供控制器与网关运行时共享的数据结构和错误处理，
//! 包括资源命名约定、转换器配置快照以及事件信封。

pub mod models;
pub mod error;

/// 重新导出常用类型，方便使用
pub use error::Error;
pub use error::Result;
pub use models::event::*;
pub use models::names::*;
pub use models::transformer::*;
