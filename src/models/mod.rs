pub mod review;
pub mod shop;
