pub mod device;
pub mod transport;
