//! Subcommand argument types and handlers.

pub mod cleanup;
pub mod group_move;
pub mod pulp;
pub mod quota;
pub mod usage;
