//! Cryptography module
//!
//! Stream ciphers used to obfuscate outgoing packet frames:
//! - [`StreamCipher`] / [`StreamCipherProvider`], the per-connection interface
//! - ISAAC, the cipher the RS protocol family keys from the login seeds

pub mod isaac;

pub use isaac::{Isaac, IsaacProvider};

/// Per-connection keystream applied to outgoing frames
pub trait StreamCipher: Send {
    /// Next 32-bit keystream word
    fn next_int(&mut self) -> u32;

    /// Obfuscate a frame opcode with the next keystream byte
    fn encode_opcode(&mut self, opcode: u8) -> u8 {
        opcode.wrapping_add(self.next_int() as u8)
    }
}

/// Builds a connection's stream cipher from its login seed
pub trait StreamCipherProvider: Send + Sync {
    fn provide(&self, seed: &[u32; 4]) -> Box<dyn StreamCipher>;
}

/// Cipher that leaves opcodes untouched, for connections without obfuscation
#[derive(Debug, Default, Clone, Copy)]
pub struct NopStreamCipher;

impl StreamCipher for NopStreamCipher {
    fn next_int(&mut self) -> u32 {
        0
    }
}

/// Provider for [`NopStreamCipher`]
#[derive(Debug, Default, Clone, Copy)]
pub struct NopStreamCipherProvider;

impl StreamCipherProvider for NopStreamCipherProvider {
    fn provide(&self, _seed: &[u32; 4]) -> Box<dyn StreamCipher> {
        Box::new(NopStreamCipher)
    }
}
