pub mod auth;
pub mod maps;
pub mod review;
pub mod shop;
