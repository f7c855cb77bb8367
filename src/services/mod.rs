pub mod store_service;
pub mod submit_service;
