pub mod discovery;
pub mod object_keys;
