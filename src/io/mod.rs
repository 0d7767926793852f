pub mod input;
pub mod mrc;
pub mod npy;
pub mod output;
