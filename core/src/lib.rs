pub mod errors;
pub mod history;
pub mod monitoring;
