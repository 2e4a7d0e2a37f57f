mod app;
mod message;
mod screens;
mod state;
mod widgets;

pub use app::{CrackcamApp, run};
pub use message::Message;
pub use state::AppState;
