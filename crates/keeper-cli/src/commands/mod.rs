//! Command implementations.

pub mod check;
pub mod jobs;
pub mod start;

pub use self::check::execute_check;
pub use self::jobs::execute_jobs;
pub use self::start::execute_start;
