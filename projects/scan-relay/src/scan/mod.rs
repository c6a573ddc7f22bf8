pub mod formats;
pub mod gate;
pub mod pipeline;
pub mod session;
