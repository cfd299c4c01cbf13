use std::fmt;

use rand::Rng;

use crate::domain::errors::{DomainError, Result};

/// Smallest and largest setup passcodes the protocol accepts
const MIN_PASSCODE: u32 = 1;
const MAX_PASSCODE: u32 = 99_999_998;

/// Degenerate passcodes rejected by commissioners
const PASSCODE_DENYLIST: [u32; 10] = [
    11_111_111, 22_222_222, 33_333_333, 44_444_444, 55_555_555, 66_666_666, 77_777_777,
    88_888_888, 12_345_678, 87_654_321,
];

const MAX_DISCRIMINATOR: u16 = 0x0FFF;

/// Setup passcode shared with commissioners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Passcode(u32);

impl Passcode {
    pub fn new(value: u32) -> Result<Self> {
        Self::validate(value)?;
        Ok(Self(value))
    }

    /// Draw a passcode uniformly from the valid range, resampling denylisted values
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let candidate = rng.gen_range(MIN_PASSCODE..=MAX_PASSCODE);
            if !PASSCODE_DENYLIST.contains(&candidate) {
                return Self(candidate);
            }
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    fn validate(value: u32) -> Result<()> {
        if !(MIN_PASSCODE..=MAX_PASSCODE).contains(&value) || PASSCODE_DENYLIST.contains(&value) {
            return Err(DomainError::InvalidPasscode(value));
        }
        Ok(())
    }
}

impl fmt::Display for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

/// 12-bit discriminator advertised during commissioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Discriminator(u16);

impl Discriminator {
    pub fn new(value: u16) -> Result<Self> {
        if value > MAX_DISCRIMINATOR {
            return Err(DomainError::InvalidDiscriminator(value));
        }
        Ok(Self(value))
    }

    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(0..=MAX_DISCRIMINATOR))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// Upper four bits, used by the manual pairing code
    pub fn short(&self) -> u8 {
        (self.0 >> 8) as u8
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
