pub mod device;
pub mod discovery;
pub mod engine;
pub mod focus;
pub mod remote;
pub mod selector;
pub mod traits;
pub mod zbar_backend;
