//! Built-in operation handlers.

pub mod custom;
pub mod map;
pub mod scaffold;

pub use custom::CustomHandler;
pub use map::MapHandler;
pub use scaffold::ScaffoldHandler;
