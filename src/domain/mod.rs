pub mod entities;
pub mod errors;
pub mod services;
pub mod value_objects;
