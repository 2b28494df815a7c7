//! Certificate authority and its on-disk store.

pub mod authority;
pub mod store;

pub use authority::CertificateAuthority;
pub use store::SslStore;
