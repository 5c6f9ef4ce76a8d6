/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::XoShiRo;

/// FNV-64 prime, used to chain stack contents into a square's hash.
pub(crate) const PRIME64: u64 = 1_099_511_628_211;

/// One base hash key per board square (8×8 maximum).
///
/// A square's hash starts from its key and folds in every stone of the
/// stack, top to bottom, with an xor/multiply chain; the position hash is
/// the xor over all occupied squares. Generated once, at compilation.
pub(crate) const SQUARE_KEYS: [u64; 64] = {
    let mut keys = [0; 64];
    let mut prng = XoShiRo::new();
    let mut i = 0;
    while i < 64 {
        let key;
        (key, prng) = prng.next_const();
        keys[i] = key;
        i += 1;
    }
    keys
};

/// Key folded into the position hash when Black is to move.
pub(crate) const SIDE_KEY: u64 = {
    let mut prng = XoShiRo::new();
    let mut i = 0;
    // Skip past the square keys so the side key is independent of them.
    while i < 64 {
        (_, prng) = prng.next_const();
        i += 1;
    }
    let (key, _) = prng.next_const();
    key
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_nonzero_and_distinct() {
        for (i, a) in SQUARE_KEYS.iter().enumerate() {
            assert_ne!(*a, 0, "square key {i} is zero");
            assert_ne!(*a, SIDE_KEY);
            for b in &SQUARE_KEYS[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_ne!(SIDE_KEY, 0);
    }
}
