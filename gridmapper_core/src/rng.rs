use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{invalid, Error, Result};

// Provably-fair byte stream:
// HMAC-SHA256(key = server_seed, msg = "client_seed:nonce:round") -> 32 bytes per round -> floats in [0,1)

pub type HmacSha256 = Hmac<Sha256>;

const BLOCK_LEN: usize = 32;

/// SHA-256 of the input, hex encoded. Used as the public commitment to a server seed.
pub fn derive_hash_hex(input: &[u8]) -> String {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Maps four bytes to a float in [0,1), most significant byte first.
///
/// The sum is accumulated left to right from zero; independent verifiers do the same,
/// so the evaluation order must not change.
pub fn bytes_to_float(bytes: [u8; 4]) -> f64 {
    bytes
        .iter()
        .enumerate()
        .fold(0.0, |acc, (i, &b)| acc + f64::from(b) / 256f64.powi(i as i32 + 1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RngParams {
    server_seed: String, // secret
    client_seed: String,
    nonce: u64,
}

impl RngParams {
    pub fn new(
        server_seed: impl Into<String>,
        client_seed: impl Into<String>,
        nonce: u64,
    ) -> Result<Self> {
        let server_seed = server_seed.into();
        let client_seed = client_seed.into();
        if server_seed.is_empty() {
            return Err(invalid("server seed is empty"));
        }
        if client_seed.is_empty() {
            return Err(invalid("client seed is empty"));
        }
        Ok(Self {
            server_seed,
            client_seed,
            nonce,
        })
    }

    pub fn server_seed(&self) -> &str {
        &self.server_seed
    }

    pub fn client_seed(&self) -> &str {
        &self.client_seed
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn server_seed_hash_hex(&self) -> String {
        derive_hash_hex(self.server_seed.as_bytes())
    }

    pub fn bytes(&self) -> Result<ByteStream> {
        ByteStream::new(self)
    }

    pub fn floats(&self) -> Result<FloatStream> {
        FloatStream::new(self)
    }
}

/// Endless byte stream keyed by the server seed. Each round contributes one 32-byte digest.
#[derive(Clone)]
pub struct ByteStream {
    mac: HmacSha256,
    prefix: String,
    round: u64,
    block: [u8; BLOCK_LEN],
    pos: usize,
    read: u64,
}

impl ByteStream {
    pub fn new(params: &RngParams) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(params.server_seed.as_bytes())
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(Self {
            mac,
            prefix: format!("{}:{}:", params.client_seed, params.nonce),
            round: 0,
            block: [0u8; BLOCK_LEN],
            pos: BLOCK_LEN,
            read: 0,
        })
    }

    fn refill(&mut self) {
        let mut mac = self.mac.clone();
        mac.update(self.prefix.as_bytes());
        mac.update(self.round.to_string().as_bytes());
        self.block.copy_from_slice(&mac.finalize().into_bytes());
        self.round += 1;
        self.pos = 0;
    }

    pub fn next_byte(&mut self) -> u8 {
        if self.pos == BLOCK_LEN {
            self.refill();
        }
        let b = self.block[self.pos];
        self.pos += 1;
        self.read += 1;
        b
    }

    /// Bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Digest rounds computed so far.
    pub fn rounds(&self) -> u64 {
        self.round
    }
}

impl Iterator for ByteStream {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        Some(self.next_byte())
    }
}

#[derive(Clone)]
pub struct FloatStream {
    bytes: ByteStream,
    read: u64,
}

impl FloatStream {
    pub fn new(params: &RngParams) -> Result<Self> {
        Ok(Self::from_bytes(ByteStream::new(params)?))
    }

    pub fn from_bytes(bytes: ByteStream) -> Self {
        Self { bytes, read: 0 }
    }

    pub fn next_float(&mut self) -> f64 {
        let mut chunk = [0u8; 4];
        for b in chunk.iter_mut() {
            *b = self.bytes.next_byte();
        }
        self.read += 1;
        bytes_to_float(chunk)
    }

    pub fn floats_read(&self) -> u64 {
        self.read
    }

    pub fn byte_stream(&self) -> &ByteStream {
        &self.bytes
    }
}

impl Iterator for FloatStream {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_float())
    }
}
