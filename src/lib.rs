pub mod app;
pub mod clipboard;
pub mod command;
pub mod config;
pub mod content;
pub mod context;
pub mod crypto;
pub mod editor;
pub mod error;
pub mod storage;
pub mod view;

#[cfg(test)]
mod testing;
