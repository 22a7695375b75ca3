#![allow(dead_code)]
use std::path::PathBuf;

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

/// Packs values most significant bit first, the way records are laid out on disk.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Append the low `width` bits of `value`.
    pub fn put(&mut self, value: u64, width: usize) -> &mut Self {
        assert!(width <= 64);
        for i in (0..width).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
        self
    }

    pub fn put_f32(&mut self, value: f32) -> &mut Self {
        self.put(u64::from(value.to_bits()), 32)
    }

    pub fn put_f64(&mut self, value: f64) -> &mut Self {
        self.put(value.to_bits(), 64)
    }

    pub fn put_bytes(&mut self, dat: &[u8]) -> &mut Self {
        for b in dat {
            self.put(u64::from(*b), 8);
        }
        self
    }

    /// Append zero bits until the length is `bit_len`.
    pub fn pad_to(&mut self, bit_len: usize) -> &mut Self {
        assert!(bit_len >= self.bit_len, "already past {bit_len}");
        while self.bit_len < bit_len {
            self.push_bit(false);
        }
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bit_len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }
}
