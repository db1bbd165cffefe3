pub mod notes;
pub mod purge;
pub mod resume;
pub mod runs;
pub mod serve;
