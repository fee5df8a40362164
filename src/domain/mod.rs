//! Domain types: values, aggregates and recorded facts.
pub mod aggregates;
pub mod events;
pub mod value_objects;
