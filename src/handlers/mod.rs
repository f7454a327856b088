pub mod ask;
pub mod knowledge;
pub mod perf;
pub mod system;
