//! XOR Folding
//!
//! Halves a finished filter by XORing its two halves. Folding trades
//! filter size (and some accuracy) for hardened privacy: each output
//! bit mixes two input positions. Folding identically-keyed filters
//! preserves the ordering of their Hamming distances in expectation.

use crate::bloom::BitVector;

#[derive(Debug, thiserror::Error)]
#[error("cannot fold a bit vector of odd length {0}")]
pub struct FoldError(pub usize);

/// Fold `bits` in half `folds` times.
///
/// Applied once per requested fold after all fields are inserted, never
/// between fields. Each fold requires the current length to be even.
pub fn fold_xor(bits: BitVector, folds: u32) -> Result<BitVector, FoldError> {
    let mut current = bits;
    for _ in 0..folds {
        if current.len() % 2 != 0 {
            return Err(FoldError(current.len()));
        }
        let (mut first, second) = current.halves();
        first.xor_with(&second);
        current = first;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_halves_length() {
        let bv = BitVector::zeros(1024);
        for folds in 0..4 {
            let folded = fold_xor(bv.clone(), folds).unwrap();
            assert_eq!(folded.len(), 1024 >> folds);
        }
    }

    #[test]
    fn test_single_fold_xors_halves() {
        let mut bv = BitVector::zeros(16);
        bv.set(0);
        bv.set(8);
        bv.set(9);
        let folded = fold_xor(bv, 1).unwrap();
        assert_eq!(folded.len(), 8);
        assert!(!folded.get(0)); // 1 ^ 1
        assert!(folded.get(1)); // 0 ^ 1
        assert_eq!(folded.count_ones(), 1);
    }

    #[test]
    fn test_zero_folds_is_identity() {
        let bv = BitVector::from_bytes(vec![0xab, 0xcd]);
        let folded = fold_xor(bv.clone(), 0).unwrap();
        assert_eq!(folded, bv);
    }

    #[test]
    fn test_fold_commutes_with_xor() {
        let a = BitVector::from_bytes(vec![0x12, 0x34, 0x56, 0x78]);
        let b = BitVector::from_bytes(vec![0x9a, 0xbc, 0xde, 0xf0]);

        let mut xored = a.clone();
        xored.xor_with(&b);
        let fold_then_xor = {
            let mut fa = fold_xor(a, 1).unwrap();
            let fb = fold_xor(b, 1).unwrap();
            fa.xor_with(&fb);
            fa
        };
        assert_eq!(fold_xor(xored, 1).unwrap(), fold_then_xor);
    }

    #[test]
    fn test_odd_length_is_rejected() {
        let mut bv = BitVector::zeros(7);
        bv.set(3);
        assert!(fold_xor(bv, 1).is_err());
    }
}
