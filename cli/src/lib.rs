pub mod commands;
pub mod demo;
pub mod readline;

pub use commands::Harness;
pub use readline::readline;
