//! 报文捕获（用于离线分析）
//!
//! 链路上每个数据报记一条结构化记录，可整体导出为 JSON 数组。

mod types;

pub use types::{CaptureLog, CaptureRecord};
