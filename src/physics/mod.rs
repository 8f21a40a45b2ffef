pub mod minimum_image;
pub mod neighbors;
pub mod operations;
