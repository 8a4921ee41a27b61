pub mod devices;
pub mod load;
pub mod service;
