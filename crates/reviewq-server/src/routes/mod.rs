pub mod aggregates;
pub mod cards;
pub mod conversation;
pub mod events;
pub mod focus;
pub mod queue;
pub mod selection;
