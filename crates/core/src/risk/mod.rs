pub mod aggregate;
pub mod component;
pub mod portfolio;
