//! Job orchestration

pub mod supervisor;

pub use supervisor::JobSupervisor;
