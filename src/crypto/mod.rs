pub mod hash;
pub mod sensitive;
