pub mod cache;
pub mod geo;
pub mod middleware;
