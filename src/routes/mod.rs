pub mod assets;
pub mod auth;
pub mod health;
pub mod pages;
pub mod plans;
pub mod schools;
pub mod websocket;
