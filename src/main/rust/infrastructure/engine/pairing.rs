//! Onboarding payload rendering: the 11-digit manual code and the `MT:` QR text.

use crate::domain::ports::PairingCodes;
use crate::domain::value_objects::{Discriminator, Passcode};

const BASE38_ALPHABET: &[u8; 38] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.";

/// Discovery over IP only
const RENDEZVOUS_ON_NETWORK: u8 = 0x04;

const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

const VERHOEFF_INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

/// Inputs of both pairing codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingPayload {
    pub vendor_id: u16,
    pub product_id: u16,
    pub discriminator: Discriminator,
    pub passcode: Passcode,
}

impl OnboardingPayload {
    pub fn codes(&self) -> PairingCodes {
        PairingCodes {
            qr_pairing_code: self.qr_code(),
            manual_pairing_code: self.manual_code(),
        }
    }

    pub fn manual_code(&self) -> String {
        let short = u32::from(self.discriminator.short());
        let passcode = self.passcode.value();

        let chunk1 = short >> 2;
        let chunk2 = ((short & 0x3) << 14) | (passcode & 0x3FFF);
        let chunk3 = passcode >> 14;

        let digits = format!("{}{:05}{:04}", chunk1, chunk2, chunk3);
        let check = verhoeff_check_digit(&digits);
        format!("{}{}", digits, check)
    }

    pub fn qr_code(&self) -> String {
        let mut writer = BitWriter::default();
        writer.push(0, 3); // version
        writer.push(u64::from(self.vendor_id), 16);
        writer.push(u64::from(self.product_id), 16);
        writer.push(0, 2); // standard commissioning flow
        writer.push(u64::from(RENDEZVOUS_ON_NETWORK), 8);
        writer.push(u64::from(self.discriminator.value()), 12);
        writer.push(u64::from(self.passcode.value()), 27);
        writer.push(0, 4); // padding

        format!("MT:{}", base38_encode(&writer.into_bytes()))
    }
}

#[derive(Default)]
struct BitWriter {
    value: u128,
    len: u32,
}

impl BitWriter {
    fn push(&mut self, value: u64, bits: u32) {
        let mask = (1u128 << bits) - 1;
        self.value |= (u128::from(value) & mask) << self.len;
        self.len += bits;
    }

    fn into_bytes(self) -> Vec<u8> {
        let byte_len = self.len.div_ceil(8) as usize;
        self.value.to_le_bytes()[..byte_len].to_vec()
    }
}

fn base38_encode(bytes: &[u8]) -> String {
    let mut out = String::new();
    for chunk in bytes.chunks(3) {
        let mut value = chunk
            .iter()
            .rev()
            .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        let chars = match chunk.len() {
            3 => 5,
            2 => 4,
            _ => 2,
        };
        for _ in 0..chars {
            out.push(BASE38_ALPHABET[(value % 38) as usize] as char);
            value /= 38;
        }
    }
    out
}

fn verhoeff_check_digit(digits: &str) -> u8 {
    let check = digits
        .bytes()
        .rev()
        .enumerate()
        .fold(0u8, |c, (i, b)| {
            let digit = (b - b'0') as usize;
            VERHOEFF_D[c as usize][VERHOEFF_P[(i + 1) % 8][digit] as usize]
        });
    VERHOEFF_INV[check as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_payload() -> OnboardingPayload {
        OnboardingPayload {
            vendor_id: 0xFFF1,
            product_id: 0x8000,
            discriminator: Discriminator::new(3840).unwrap(),
            passcode: Passcode::new(20_202_021).unwrap(),
        }
    }

    #[test]
    fn test_manual_code() {
        assert_eq!(reference_payload().manual_code(), "34970112332");
    }

    #[test]
    fn test_qr_code() {
        let qr = reference_payload().qr_code();
        assert_eq!(qr, "MT:Y.K90AFN00KA0648G00");
        assert_eq!(qr.len(), 22);
    }

    #[test]
    fn test_manual_code_is_eleven_digits() {
        let payload = OnboardingPayload {
            discriminator: Discriminator::new(0).unwrap(),
            passcode: Passcode::new(1).unwrap(),
            ..reference_payload()
        };
        let code = payload.manual_code();
        assert_eq!(code.len(), 11);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }
}
