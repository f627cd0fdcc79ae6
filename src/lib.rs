pub mod dataset;
pub mod logging;
pub mod output;
pub mod parser;
pub mod plot;
