pub mod error;
pub mod identity;
pub mod pairing;

pub use error::CryptoError;
pub use identity::Identity;
pub use pairing::HashAlgo;
