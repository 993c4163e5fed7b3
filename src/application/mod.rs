//! Application services layer scaffolding.

pub mod repos;
pub mod search;
pub mod slugs;
