pub mod bounds;
pub mod builder;
pub mod config;
pub mod constants;
pub mod description;
pub mod geo;
pub mod kind;
pub mod projection;
pub mod registry;
pub mod scene;
