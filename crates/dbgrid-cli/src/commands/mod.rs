pub mod resource;
pub mod status;
pub mod tunables;
