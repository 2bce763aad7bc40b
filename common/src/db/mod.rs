pub mod design;
pub mod device;
pub mod indices;
