//! Offline perfect-hash table construction.
//!
//! Construction happens once, before traffic: pick up to eight byte
//! positions that best tell the registered route keys apart, fold those
//! bytes into a `u64` per route, then search a fixed candidate space of
//! `(table size, shift, seed)` triples for one that maps every key to a
//! distinct slot. The search order is fixed, so the same route set
//! always yields a bit-identical table.
//!
//! Lookup cost at runtime is one multiply, one shift, one mask (or
//! modulo for minimal tables) and one slot probe.

use crate::errors::BuildError;
use crate::http::request_line::FINGERPRINT_LEN;
use crate::limits::RouterLimits;

/// Fixed multiplier pool, tried in order. Odd constants with a roughly
/// even bit spread; the exact values only matter for reproducibility.
pub(crate) const SEED_POOL: [u64; 16] = [
    0x9E37_79B9_7F4A_7C15,
    0xC2B2_AE3D_27D4_EB4F,
    0xFF51_AFD7_ED55_8CCD,
    0xC6A4_A793_5BD1_E995,
    0x2545_F491_4F6C_DD1D,
    0x9E6C_63D0_876A_9F4B,
    0xA24B_AED4_963E_E407,
    0x9FB2_1C65_1E98_DF25,
    0xD6E8_FEB8_6659_FD93,
    0x8CB9_2BA7_2F3D_8DD7,
    0xABCD_EF01_2345_6789,
    0xF123_4567_89AB_CDEF,
    0x6C62_272E_07BB_0142,
    0x5851_F42D_4C95_7F2D,
    0x1405_7B7E_F767_814F,
    0xB492_B66F_BE98_F273,
];

/// Largest power-of-two table exponent tried before giving up.
const MAX_TABLE_EXP: u32 = 10;
const MAX_SHIFT: u32 = 60;
const MAX_SHIFT_MINIMAL: u32 = 32;

/// One point in the candidate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HashCandidate {
    pub(crate) seed: u64,
    pub(crate) shift: u32,
    pub(crate) table_size: usize,
    pub(crate) minimal: bool,
}

impl HashCandidate {
    #[inline(always)]
    pub(crate) fn slot(&self, key: u64) -> usize {
        let hashed = key.wrapping_mul(self.seed) >> self.shift;
        if self.minimal {
            (hashed % self.table_size as u64) as usize
        } else {
            hashed as usize & (self.table_size - 1)
        }
    }
}

/// Folds the chosen fingerprint positions into one zero-padded key.
#[inline(always)]
pub(crate) fn extract_key(fp: &[u8; FINGERPRINT_LEN], positions: &[usize]) -> u64 {
    let mut key = 0u64;
    for &pos in positions {
        key = key << 8 | fp[pos] as u64;
    }
    key
}

/// Greedy position selection: each round adopts the position that
/// separates the most route keys when appended to the positions chosen
/// so far. Ties resolve to the lowest index, so selection is
/// deterministic.
fn choose_positions(fps: &[[u8; FINGERPRINT_LEN]], max_width: usize) -> Vec<usize> {
    let n = fps.len();
    let width = max_width.clamp(1, 8);
    let mut chosen: Vec<usize> = Vec::new();

    while chosen.len() < width {
        let current = if chosen.is_empty() {
            1
        } else {
            distinct_keys(fps, &chosen, None)
        };
        if current == n && !chosen.is_empty() {
            break;
        }

        let mut best: Option<(usize, usize)> = None;
        for pos in 0..FINGERPRINT_LEN {
            if chosen.contains(&pos) {
                continue;
            }
            let separated = distinct_keys(fps, &chosen, Some(pos));
            if best.map_or(true, |(best_sep, _)| separated > best_sep) {
                best = Some((separated, pos));
            }
        }

        match best {
            Some((separated, pos)) if separated > current => chosen.push(pos),
            // No remaining position separates anything further.
            _ => break,
        }
    }

    chosen
}

fn distinct_keys(
    fps: &[[u8; FINGERPRINT_LEN]],
    chosen: &[usize],
    extra: Option<usize>,
) -> usize {
    let mut keys: Vec<u64> = fps
        .iter()
        .map(|fp| {
            let mut key = extract_key(fp, chosen);
            if let Some(pos) = extra {
                key = key << 8 | fp[pos] as u64;
            }
            key
        })
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

fn search(keys: &[u64], limits: &RouterLimits) -> Option<HashCandidate> {
    let mut scratch: Vec<bool> = Vec::new();

    if limits.minimal_table {
        let table_size = keys.len();
        for shift in 0..MAX_SHIFT_MINIMAL {
            for &seed in &SEED_POOL {
                let candidate = HashCandidate {
                    seed,
                    shift,
                    table_size,
                    minimal: true,
                };
                if collision_free(keys, candidate, &mut scratch) {
                    return Some(candidate);
                }
            }
        }
        return None;
    }

    for exp in 1..=MAX_TABLE_EXP {
        let table_size = 1usize << exp;
        if table_size < keys.len() {
            continue;
        }
        for shift in 0..MAX_SHIFT {
            for &seed in &SEED_POOL {
                let candidate = HashCandidate {
                    seed,
                    shift,
                    table_size,
                    minimal: false,
                };
                if collision_free(keys, candidate, &mut scratch) {
                    return Some(candidate);
                }
            }
        }
    }

    None
}

fn collision_free(keys: &[u64], candidate: HashCandidate, scratch: &mut Vec<bool>) -> bool {
    scratch.clear();
    scratch.resize(candidate.table_size, false);

    for &key in keys {
        let slot = candidate.slot(key);
        if scratch[slot] {
            return false;
        }
        scratch[slot] = true;
    }
    true
}

/// A built table. Slots hold route indices; `verify` holds the full
/// extracted key that produced each occupied slot. Leading and trailing
/// empty slots are trimmed away, with `subtraction` recording how many
/// leading slots were cut.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PerfectHashTable {
    candidate: HashCandidate,
    positions: Vec<usize>,
    subtraction: usize,
    slots: Box<[Option<u16>]>,
    verify: Box<[u64]>,
}

impl PerfectHashTable {
    /// Builds a table over the route fingerprints, in registration
    /// order. `NoCandidate` means the caller must fall back to
    /// sequential matching; it is not fatal.
    pub(crate) fn build(
        fps: &[[u8; FINGERPRINT_LEN]],
        limits: &RouterLimits,
    ) -> Result<Self, BuildError> {
        if fps.is_empty() {
            return Err(BuildError::EmptyRouteSet);
        }
        if fps.len() > u16::MAX as usize {
            return Err(BuildError::NoCandidate);
        }

        let positions = choose_positions(fps, limits.max_key_width);
        let keys: Vec<u64> = fps.iter().map(|fp| extract_key(fp, &positions)).collect();

        // Two routes agreeing on every extracted byte can never occupy
        // distinct slots.
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(BuildError::NoCandidate);
        }

        let candidate = search(&keys, limits).ok_or(BuildError::NoCandidate)?;

        let mut slots = vec![None; candidate.table_size];
        let mut verify = vec![0u64; candidate.table_size];
        for (route, &key) in keys.iter().enumerate() {
            let slot = candidate.slot(key);
            slots[slot] = Some(route as u16);
            verify[slot] = key;
        }

        let first = slots.iter().position(Option::is_some).unwrap_or(0);
        let last = slots.iter().rposition(Option::is_some).unwrap_or(0);

        Ok(Self {
            candidate,
            positions,
            subtraction: first,
            slots: slots[first..=last].into(),
            verify: verify[first..=last].into(),
        })
    }

    /// Maps a request fingerprint to a route index. With `verify_key`
    /// set, a slot hit whose stored key differs from the extracted key
    /// is rejected.
    #[inline(always)]
    pub(crate) fn lookup(&self, fp: &[u8; FINGERPRINT_LEN], verify_key: bool) -> Option<u16> {
        let key = extract_key(fp, &self.positions);
        let slot = self.candidate.slot(key).checked_sub(self.subtraction)?;
        let route = (*self.slots.get(slot)?)?;
        if verify_key && self.verify[slot] != key {
            return None;
        }
        Some(route)
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
