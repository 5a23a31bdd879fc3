use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::{Aes256, Block};
use ctr::Ctr32BE;
use ghash::universal_hash::UniversalHash;
use ghash::GHash;

/// AES-GCM nonce length in bytes (96-bit nonces only).
pub const GCM_NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const GCM_TAG_LEN: usize = 16;

/// Incremental AES-256-GCM encryption with a single trailing tag.
///
/// The `aes-gcm` crate only offers one-shot AEAD, which would require
/// holding a whole segment's plaintext in memory. This composes the same
/// primitives it is built from — a CTR keystream with a 32-bit big-endian
/// counter and an incrementally updated GHASH (NIST SP 800-38D, empty AAD)
/// — so chunks are encrypted the moment they are captured. The output is
/// bit-for-bit what one-shot `Aes256Gcm::encrypt` would produce: finalized
/// segments decrypt with the stock `aes-gcm` crate.
pub struct SegmentStreamCipher {
    keystream: Ctr32BE<Aes256>,
    ghash: GHash,
    /// E(K, J0): masks the GHASH output into the final tag.
    tag_mask: Block,
    /// Ciphertext bytes not yet forming a full GHASH block.
    residual: [u8; 16],
    residual_len: usize,
    ciphertext_len: u64,
}

impl SegmentStreamCipher {
    pub fn new(key: &[u8; 32], nonce: &[u8; GCM_NONCE_LEN]) -> Self {
        let block_cipher = Aes256::new(GenericArray::from_slice(key));

        // Hash subkey H = E(K, 0^128).
        let mut hash_key = Block::default();
        block_cipher.encrypt_block(&mut hash_key);
        let ghash = GHash::new(&hash_key);

        // J0 = nonce || 0^31 || 1 for 96-bit nonces.
        let mut counter_block = [0u8; 16];
        counter_block[..GCM_NONCE_LEN].copy_from_slice(nonce);
        counter_block[15] = 1;
        let mut tag_mask = Block::clone_from_slice(&counter_block);
        block_cipher.encrypt_block(&mut tag_mask);

        // Payload keystream starts at counter value 2 = inc32(J0).
        counter_block[15] = 2;
        let keystream = Ctr32BE::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(&counter_block),
        );

        Self {
            keystream,
            ghash,
            tag_mask,
            residual: [0u8; 16],
            residual_len: 0,
            ciphertext_len: 0,
        }
    }

    /// Encrypt `buf` in place and absorb the resulting ciphertext into the
    /// running tag state. Chunks may be any length, including zero.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        self.keystream.apply_keystream(buf);
        self.absorb(buf);
    }

    fn absorb(&mut self, mut data: &[u8]) {
        self.ciphertext_len += data.len() as u64;

        if self.residual_len > 0 {
            let take = data.len().min(16 - self.residual_len);
            self.residual[self.residual_len..self.residual_len + take].copy_from_slice(&data[..take]);
            self.residual_len += take;
            data = &data[take..];
            if self.residual_len == 16 {
                self.ghash.update(&[Block::clone_from_slice(&self.residual)]);
                self.residual_len = 0;
            }
        }

        let full = data.len() - data.len() % 16;
        for chunk in data[..full].chunks_exact(16) {
            self.ghash.update(&[Block::clone_from_slice(chunk)]);
        }

        let rest = &data[full..];
        self.residual[..rest.len()].copy_from_slice(rest);
        self.residual_len = rest.len();
    }

    /// Consume the cipher and produce the 16-byte authentication tag.
    pub fn finalize(mut self) -> [u8; GCM_TAG_LEN] {
        if self.residual_len > 0 {
            let mut last = [0u8; 16];
            last[..self.residual_len].copy_from_slice(&self.residual[..self.residual_len]);
            self.ghash.update(&[Block::clone_from_slice(&last)]);
        }

        // Length block: 64-bit AAD bit count (always 0) || ciphertext bit count.
        let mut lengths = [0u8; 16];
        lengths[8..].copy_from_slice(&(self.ciphertext_len * 8).to_be_bytes());
        self.ghash.update(&[Block::clone_from_slice(&lengths)]);

        let digest = self.ghash.finalize();
        let mut tag = [0u8; GCM_TAG_LEN];
        for (i, byte) in tag.iter_mut().enumerate() {
            *byte = digest[i] ^ self.tag_mask[i];
        }
        tag
    }

    /// Total ciphertext bytes produced so far.
    pub fn ciphertext_len(&self) -> u64 {
        self.ciphertext_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::rand_core::RngCore;
    use aes_gcm::aead::{Aead, OsRng};
    use aes_gcm::{Aes256Gcm, Nonce};

    fn one_shot_encrypt(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8]) -> Vec<u8> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
        cipher.encrypt(Nonce::from_slice(nonce), plaintext).unwrap()
    }

    fn streamed_encrypt(key: &[u8; 32], nonce: &[u8; 12], chunks: &[&[u8]]) -> Vec<u8> {
        let mut cipher = SegmentStreamCipher::new(key, nonce);
        let mut out = Vec::new();
        for chunk in chunks {
            let mut buf = chunk.to_vec();
            cipher.encrypt_in_place(&mut buf);
            out.extend_from_slice(&buf);
        }
        out.extend_from_slice(&cipher.finalize());
        out
    }

    #[test]
    fn matches_one_shot_gcm_for_odd_chunk_sizes() {
        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);

        let plaintext: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        let chunks: Vec<&[u8]> = vec![
            &plaintext[..7],
            &plaintext[7..23],
            &plaintext[23..23],
            &plaintext[23..56],
            &plaintext[56..320],
            &plaintext[320..],
        ];

        let streamed = streamed_encrypt(&key, &nonce, &chunks);
        let one_shot = one_shot_encrypt(&key, &nonce, &plaintext);
        assert_eq!(streamed, one_shot);
    }

    #[test]
    fn matches_one_shot_gcm_for_block_aligned_chunks() {
        let mut key = [0u8; 32];
        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut nonce);

        let plaintext = vec![0x5Au8; 4096];
        let chunks: Vec<&[u8]> = plaintext.chunks(256).collect();

        let streamed = streamed_encrypt(&key, &nonce, &chunks);
        let one_shot = one_shot_encrypt(&key, &nonce, &plaintext);
        assert_eq!(streamed, one_shot);
    }

    #[test]
    fn empty_plaintext_yields_bare_tag() {
        let key = [0x11u8; 32];
        let nonce = [0x22u8; 12];

        let streamed = streamed_encrypt(&key, &nonce, &[]);
        let one_shot = one_shot_encrypt(&key, &nonce, b"");
        assert_eq!(streamed.len(), GCM_TAG_LEN);
        assert_eq!(streamed, one_shot);
    }

    #[test]
    fn tracks_ciphertext_length() {
        let mut cipher = SegmentStreamCipher::new(&[0u8; 32], &[0u8; 12]);
        let mut buf = vec![0u8; 100];
        cipher.encrypt_in_place(&mut buf);
        let mut buf = vec![0u8; 29];
        cipher.encrypt_in_place(&mut buf);
        assert_eq!(cipher.ciphertext_len(), 129);
    }
}
