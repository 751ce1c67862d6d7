pub mod delivery;
pub mod model;
pub mod storage;
pub mod transport;
