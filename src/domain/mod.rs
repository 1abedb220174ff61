pub mod color;
pub mod error;
pub mod led;
pub mod models;
pub mod preferences;
pub mod settings;
