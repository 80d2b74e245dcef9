pub mod geometry;
pub mod kmz_reader;
pub mod parser;
