pub mod components;
pub mod cookies;
pub mod errors;
pub mod flow;
pub mod oauth;
pub mod routes;
pub mod setup;
pub mod state;
pub mod storage;
