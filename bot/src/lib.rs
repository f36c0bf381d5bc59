pub mod api;
pub mod entrypoints;
pub mod events;
pub mod messages;
