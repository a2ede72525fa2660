//! Secret types for key material that must never reach a log line.
//!
//! Session keys and IVs negotiated with the sender are carried in
//! [`KeyMaterial`], a `SecretBox<[u8]>` from the [`secrecy`] crate. Its
//! `Debug` output is redacted, so any struct deriving `Debug` that holds key
//! material is safe to pass to `tracing` fields. The bytes are zeroized on
//! drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{key_material, ExposeSecret};
//!
//! let key = key_material(&[0xaa; 32]);
//! assert!(format!("{key:?}").contains("REDACTED"));
//! assert_eq!(key.expose_secret().len(), 32);
//! ```

pub use secrecy::{ExposeSecret, SecretBox};

/// Opaque key/IV bytes.
pub type KeyMaterial = SecretBox<[u8]>;

/// Copy `bytes` into a fresh [`KeyMaterial`].
#[must_use]
pub fn key_material(bytes: &[u8]) -> KeyMaterial {
    SecretBox::new(bytes.to_vec().into_boxed_slice())
}
