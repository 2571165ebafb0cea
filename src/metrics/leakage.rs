//! Leakage models
//!
//! A leakage model maps a key guess and known plaintext to a predicted
//! scalar proxy for power consumption. The canonical models here target
//! the AES S-box output: Hamming weight of `Sbox[pt ^ k]`, and Hamming
//! distance between the S-box input and output. Plaintext arrays arrive
//! as datasets read back from the store, so they are `f64`-valued byte
//! rows.

use ndarray::{Array1, Array2};

use crate::{Error, Result};

/// The AES S-box lookup table.
pub const AES_SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab,
    0x76, 0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4,
    0x72, 0xc0, 0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71,
    0xd8, 0x31, 0x15, 0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2,
    0xeb, 0x27, 0xb2, 0x75, 0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6,
    0xb3, 0x29, 0xe3, 0x2f, 0x84, 0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb,
    0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf, 0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45,
    0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8, 0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5,
    0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2, 0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44,
    0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73, 0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a,
    0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb, 0xe0, 0x32, 0x3a, 0x0a, 0x49,
    0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79, 0xe7, 0xc8, 0x37, 0x6d,
    0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08, 0xba, 0x78, 0x25,
    0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a, 0x70, 0x3e,
    0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e, 0xe1,
    0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb,
    0x16,
];

/// Hamming weight of a byte.
#[must_use]
pub const fn hamming_weight(value: u8) -> u32 {
    value.count_ones()
}

/// Hamming distance between two bytes.
#[must_use]
pub const fn hamming_distance(a: u8, b: u8) -> u32 {
    (a ^ b).count_ones()
}

/// Extract the target plaintext byte of one row.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn target_byte_of(row: ndarray::ArrayView1<'_, f64>, target_byte: usize, trace: usize) -> Result<u8> {
    let Some(&value) = row.get(target_byte) else {
        return Err(Error::InvalidInput(format!(
            "target byte {} out of bounds for plaintext row of width {}",
            target_byte,
            row.len()
        )));
    };
    if !(0.0..=255.0).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "plaintext value {value} in trace {trace} is not a byte"
        )));
    }
    Ok(value as u8)
}

/// Hamming-weight leakage model of the AES S-box output.
///
/// Predicts, per trace, `HW(Sbox[pt[target_byte] ^ key_guess])`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `target_byte` is out of bounds or a
/// plaintext value is not a byte.
pub fn sbox_hamming_weight(
    plaintexts: &Array2<f64>,
    key_guess: u8,
    target_byte: usize,
) -> Result<Array1<f64>> {
    let mut predicted = Array1::zeros(plaintexts.nrows());
    for (trace, row) in plaintexts.rows().into_iter().enumerate() {
        let pt = target_byte_of(row, target_byte, trace)?;
        predicted[trace] = f64::from(hamming_weight(AES_SBOX[usize::from(pt ^ key_guess)]));
    }
    Ok(predicted)
}

/// Hamming-distance leakage model between the AES S-box input and output.
///
/// Predicts, per trace, `HD(pt ^ key_guess, Sbox[pt ^ key_guess])`, the
/// register-transition proxy for the S-box lookup.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `target_byte` is out of bounds or a
/// plaintext value is not a byte.
pub fn sbox_hamming_distance(
    plaintexts: &Array2<f64>,
    key_guess: u8,
    target_byte: usize,
) -> Result<Array1<f64>> {
    let mut predicted = Array1::zeros(plaintexts.nrows());
    for (trace, row) in plaintexts.rows().into_iter().enumerate() {
        let input = target_byte_of(row, target_byte, trace)? ^ key_guess;
        predicted[trace] = f64::from(hamming_distance(input, AES_SBOX[usize::from(input)]));
    }
    Ok(predicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sbox_known_values() {
        assert_eq!(AES_SBOX[0x00], 0x63);
        assert_eq!(AES_SBOX[0x53], 0xed);
        assert_eq!(AES_SBOX[0xff], 0x16);
    }

    #[test]
    fn test_hamming_weight_and_distance() {
        assert_eq!(hamming_weight(0x00), 0);
        assert_eq!(hamming_weight(0xff), 8);
        assert_eq!(hamming_weight(0xa5), 4);
        assert_eq!(hamming_distance(0xff, 0x00), 8);
        assert_eq!(hamming_distance(0x0f, 0x0e), 1);
    }

    #[test]
    fn test_sbox_hamming_weight_model() {
        // pt = 0x00, key = 0x00: HW(Sbox[0x00]) = HW(0x63) = 4
        let plaintexts = array![[0.0, 7.0], [0x53 as f64, 1.0]];
        let predicted = sbox_hamming_weight(&plaintexts, 0x00, 0).unwrap();
        assert_eq!(predicted[0], 4.0);
        // HW(Sbox[0x53]) = HW(0xed) = 6
        assert_eq!(predicted[1], 6.0);
    }

    #[test]
    fn test_target_byte_out_of_bounds() {
        let plaintexts = array![[0.0, 1.0]];
        assert!(sbox_hamming_weight(&plaintexts, 0, 5).is_err());
    }

    #[test]
    fn test_non_byte_plaintext_rejected() {
        let plaintexts = array![[300.0]];
        assert!(sbox_hamming_weight(&plaintexts, 0, 0).is_err());
        let plaintexts = array![[-1.0]];
        assert!(sbox_hamming_distance(&plaintexts, 0, 0).is_err());
    }
}
