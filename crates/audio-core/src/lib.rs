pub mod config;
pub mod controller;
pub mod convert;
pub mod decode;
pub mod device;
pub mod error;
pub mod format;
pub mod frame;
pub mod output;
pub mod pipeline;
pub mod resample;
pub mod source;
pub mod status;

#[cfg(test)]
mod test_support;
