//! sea-orm entities for the relational store.

pub mod prelude;

pub mod task;
pub mod user;
