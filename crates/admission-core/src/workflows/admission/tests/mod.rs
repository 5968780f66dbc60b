mod catalog;
mod common;
mod scores;
mod state;
