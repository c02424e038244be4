//! Reed-Solomon error correction over GF(2^8) with the reducing polynomial used by QR codes,
//! x^8 + x^4 + x^3 + x^2 + 1 (0x11D), and generator roots α^0 .. α^(n-1) where α = 2.

/// The reducing polynomial of the field, including the x^8 term.
const FIELD_POLYNOMIAL: u16 = 0x11D;

/// Multiplies two elements of the field (Russian peasant multiplication with reduction).
pub(crate) fn field_multiply(left: u8, right: u8) -> u8 {
    let mut product: u16 = 0;
    for bit in (0..8).rev() {
        product = (product << 1) ^ ((product >> 7) * FIELD_POLYNOMIAL);
        product ^= ((u16::from(right) >> bit) & 1) * u16::from(left);
    }

    product as u8
}

/// A Reed-Solomon encoder producing a fixed number of error correction codewords.
#[derive(Debug, Clone)]
pub(crate) struct ReedSolomonEncoder {
    /// Coefficients of the generator polynomial from the highest degree to the constant term,
    /// with the leading (monic) coefficient omitted.
    generator: Vec<u8>,
}

impl ReedSolomonEncoder {
    /// Builds the generator polynomial (x - α^0)(x - α^1)...(x - α^(degree-1)).
    pub(crate) fn new(degree: usize) -> Self {
        assert!(
            (1..=255).contains(&degree),
            "the degree of the generator must lie between 1 and 255"
        );

        // Start from the monomial 1 and multiply it by (x - α^i) for each root in turn
        let mut generator = vec![0u8; degree];
        generator[degree - 1] = 1;
        let mut root: u8 = 1;
        for _ in 0..degree {
            for index in 0..degree {
                generator[index] = field_multiply(generator[index], root);
                if index + 1 < degree {
                    generator[index] ^= generator[index + 1];
                }
            }
            root = field_multiply(root, 0x02);
        }

        ReedSolomonEncoder { generator }
    }

    /// Number of error correction codewords produced for every block.
    pub(crate) fn degree(&self) -> usize {
        self.generator.len()
    }

    /// Computes the remainder of the data polynomial, shifted by the degree of the generator,
    /// divided by the generator: these are the error correction codewords of the block.
    pub(crate) fn remainder(&self, data: &[u8]) -> Vec<u8> {
        let mut remainder = vec![0u8; self.degree()];
        for &codeword in data {
            let factor = codeword ^ remainder[0];
            remainder.rotate_left(1);
            let last = remainder.len() - 1;
            remainder[last] = 0;
            for (coefficient, generator_coefficient) in remainder.iter_mut().zip(&self.generator) {
                *coefficient ^= field_multiply(*generator_coefficient, factor);
            }
        }

        remainder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplication_follows_the_field_rules() {
        assert_eq!(field_multiply(0, 0x53), 0);
        assert_eq!(field_multiply(1, 0x53), 0x53);
        assert_eq!(field_multiply(0x02, 0x80), 0x1D);
        // α^8 = α^4 + α^3 + α^2 + 1
        let mut power = 1u8;
        for _ in 0..8 {
            power = field_multiply(power, 2);
        }
        assert_eq!(power, 0x1D);
        // Multiplication is commutative
        assert_eq!(field_multiply(0x57, 0x83), field_multiply(0x83, 0x57));
    }

    #[test]
    fn generator_of_degree_two() {
        // (x - 1)(x - 2) = x^2 + 3x + 2
        let encoder = ReedSolomonEncoder::new(2);
        assert_eq!(encoder.generator, vec![3, 2]);
    }

    #[test]
    fn hello_world_version_one_medium() {
        // "HELLO WORLD" in alphanumeric mode, version 1-M
        let data = [
            32, 91, 11, 120, 209, 114, 220, 77, 67, 64, 236, 17, 236, 17, 236, 17,
        ];
        let encoder = ReedSolomonEncoder::new(10);
        assert_eq!(
            encoder.remainder(&data),
            vec![196, 35, 39, 119, 235, 215, 231, 226, 93, 23]
        );
    }

    #[test]
    fn numeric_sample_version_one_medium() {
        // "01234567" in numeric mode, version 1-M
        let data = [
            0x10, 0x20, 0x0C, 0x56, 0x61, 0x80, 0xEC, 0x11, 0xEC, 0x11, 0xEC, 0x11, 0xEC, 0x11,
            0xEC, 0x11,
        ];
        let encoder = ReedSolomonEncoder::new(10);
        assert_eq!(
            encoder.remainder(&data),
            vec![0xA5, 0x24, 0xD4, 0xC1, 0xED, 0x36, 0xC7, 0x87, 0x2C, 0x55]
        );
    }
}
