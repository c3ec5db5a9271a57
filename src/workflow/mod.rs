//! 修订计划与待确认变更的数据模型

pub mod types;

pub use types::*;
