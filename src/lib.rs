// Library for tests to access modules

pub mod config;
pub mod connection;
pub mod history;
pub mod models;
pub mod session;
pub mod tracker;
pub mod view;
