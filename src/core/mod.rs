pub mod catalog;
pub mod engine;
pub mod events;
pub mod model;
pub mod reference;
pub mod selector;
pub mod store;
pub mod tracker;
