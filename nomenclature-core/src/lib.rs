pub mod aggregation;
pub mod codelist;
pub mod config;
pub mod dataset;
pub mod definition;
pub mod io;
pub mod processor;
pub mod utils;

pub mod errors;
