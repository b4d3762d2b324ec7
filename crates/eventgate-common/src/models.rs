//! 数据模型模块
//!
//! 该模块定义了 EventGate 中跨进程共享的数据模型：资源命名约定、
//! 转换器配置快照以及网关向传感器派发的事件信封。

pub mod event;
pub mod names;
pub mod transformer;
