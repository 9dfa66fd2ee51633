//! Client identity seam.
//!
//! The room protocol needs a stable opaque id per client before any
//! write is issued; who mints it is someone else's business. The trait
//! is the contract, `DeviceIdentity` the stand-in implementation.

use rand::Rng;

pub trait IdentityProvider {
    /// Stable opaque identifier for this client, or `None` while the
    /// provider has not issued one yet. Every write requires one.
    fn identity(&self) -> Option<String>;
}

/// Identity minted once at startup: sixteen random hex characters,
/// stable for the life of the process.
pub struct DeviceIdentity {
    id: String,
}

impl DeviceIdentity {
    pub fn new() -> Self {
        Self::with_rng(&mut rand::thread_rng())
    }

    pub fn with_rng(rng: &mut impl Rng) -> Self {
        const HEX: &[u8] = b"0123456789abcdef";
        let id = (0..16)
            .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
            .collect();
        Self { id }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for DeviceIdentity {
    fn identity(&self) -> Option<String> {
        Some(self.id.clone())
    }
}
