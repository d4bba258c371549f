pub mod config;
pub mod dataset;
pub mod error;
pub mod etl;
pub mod schedule;
pub mod utils;
