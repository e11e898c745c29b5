// Domain layer - Core data types

pub mod model;
