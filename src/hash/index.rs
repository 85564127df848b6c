//! Slot index computation: division vs. multiplication, and the probe
//! stepping used by open addressing.

/// How a hash is reduced to a slot index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexMethod {
    /// `hash % size`. Only picked for sizes where it spreads well.
    Division,
    /// Fractional part of `hash * golden ratio`, scaled by the size.
    Multiplication,
}

// 2^64 / golden ratio.
const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

/// Pick the index method for a table of `size` slots.
///
/// Division needs an odd size that sits well inside its power-of-two
/// bracket and is (almost) prime: divisible by at most one of the odd
/// numbers 3..=19, 15 left out since 3 and 5 cover it.
pub fn select_method(size: usize) -> IndexMethod {
    if size % 2 == 0 {
        return IndexMethod::Multiplication;
    }
    let mut lower = 64usize;
    let mut upper = 128usize;
    while lower > size {
        upper = lower;
        lower /= 2;
    }
    while upper < size {
        lower = upper;
        upper *= 2;
    }
    let middle = (lower + upper) / 2;
    let mid_dist = middle.abs_diff(size);
    if mid_dist >= ((size - lower) / 2).min((upper - size) / 2) {
        return IndexMethod::Multiplication;
    }
    let divided = (3..20)
        .step_by(2)
        .filter(|d| *d != 15 && size % d == 0)
        .take(2)
        .count();
    if divided < 2 {
        IndexMethod::Division
    } else {
        IndexMethod::Multiplication
    }
}

/// Fixed-point `frac(hash * φ⁻¹) * size`.
#[inline]
pub fn multiplicative(hash: u64, size: usize) -> usize {
    ((hash.wrapping_mul(GOLDEN) as u128 * size as u128) >> 64) as usize
}

#[inline]
pub fn index_for(hash: u64, size: usize, method: IndexMethod) -> usize {
    match method {
        IndexMethod::Division => (hash % size as u64) as usize,
        IndexMethod::Multiplication => multiplicative(hash, size),
    }
}

/// Re-hash of a primary hash, independent enough to drive the stepping.
#[inline]
pub fn secondary(hash: u64) -> u64 {
    let mut z = hash.wrapping_add(GOLDEN);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Probe step for open addressing.
///
/// The result is never 0 and always coprime to `size`, so probing from any
/// base visits every slot exactly once per `size` steps. On top of that the
/// step avoids the `size * n / (n + 1)` fractions for n in 3..9, which walk
/// the table in long near-sequential runs.
pub fn stepping(hash: u64, size: usize, method: IndexMethod) -> usize {
    if size < 4 {
        return 1;
    }
    let odd = size % 2 == 1;
    let sec_size = size - if odd { 2 } else { 1 };
    let mut step = index_for(secondary(hash), sec_size, method);
    if step < 3 {
        step = if odd { 2 } else { 3 };
    }
    if size % 2 == step % 2 {
        step += 1;
    }
    for _ in 0..size {
        let mut adapted = false;
        if (3..9).any(|n| step == size * n / (n + 1)) {
            step += 2;
            adapted = true;
        }
        if gcd(size, step) != 1 {
            step += 2;
            adapted = true;
        }
        if step >= size {
            step %= size;
            if step == 0 {
                step = 1;
            }
            adapted = true;
        }
        if !adapted {
            return step;
        }
    }
    1
}
