pub mod dbf;
pub mod prj;
#[cfg(test)]
pub mod reader;
pub mod shp;
pub mod writer;
