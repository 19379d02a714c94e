pub mod mysql;
pub mod object_store;
pub mod parameter_store;
