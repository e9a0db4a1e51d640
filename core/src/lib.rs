pub mod error;
pub mod tensor;
pub mod tape;
pub mod conditioner;
pub mod markov;
pub mod histogram;
pub mod autoencoder;
pub mod adam;
pub mod ensemble;
pub mod trainer;
pub mod generator;
pub mod corpus;
pub mod config;

pub use error::{AutobyteError, Result};
