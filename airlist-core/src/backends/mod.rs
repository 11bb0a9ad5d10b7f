pub mod mock;

pub mod nmcli;

#[cfg(feature = "backend_nmdbus")]
pub mod nmdbus;

pub mod utils;
