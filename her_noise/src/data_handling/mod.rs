pub mod cells;
pub mod sample_info;
pub mod slices;
pub mod workbook;
