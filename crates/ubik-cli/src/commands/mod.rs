pub mod agents;
pub mod logs;
