pub mod analysis;
pub mod gain;
pub mod hop;
pub mod transform;
pub mod unwrap;
pub mod vocoder;
pub mod window;
