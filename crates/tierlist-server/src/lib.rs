pub mod app;
pub mod protocol;
pub mod ws_server;
