//! Thumbnail selection policy
//!
//! Picks one candidate from an ordered list given an optional
//! `min_short_side` threshold. This is pure policy over already-discovered
//! candidates -- it never triggers additional reads.

use crate::metadata::ThumbnailInfo;

/// Select the best candidate index per the policy table in the design:
///
/// - no threshold: smallest candidate (by the parser's own ordering)
/// - some candidate's short side >= threshold: the smallest such candidate
/// - none qualifies: the largest candidate by known short side (fallback)
/// - unknown dimensions are treated as "may qualify" until forced to resolve,
///   at which point ties fall back to byte-length order
///
/// Ties in short side are broken by insertion order (the first match wins).
pub fn select(candidates: &[ThumbnailInfo], min_short_side: Option<u32>) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }

    let Some(threshold) = min_short_side else {
        return smallest_index(candidates);
    };

    // Candidates whose short side is known to meet the threshold, or whose
    // dimensions are unknown (and therefore "may qualify").
    let mut qualifying: Vec<usize> = Vec::new();
    let mut known_qualifying: Vec<usize> = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        match c.short_side() {
            Some(side) if side >= threshold => {
                qualifying.push(i);
                known_qualifying.push(i);
            }
            None => qualifying.push(i),
            _ => {}
        }
    }

    if !known_qualifying.is_empty() {
        return smallest_among(candidates, &known_qualifying, true);
    }

    if !qualifying.is_empty() {
        // Only unknown-dimension candidates remain as "may qualify" --
        // resolve by byte-length order (smallest first, matching the
        // no-threshold default).
        return qualifying
            .into_iter()
            .min_by_key(|&i| candidates[i].byte_length);
    }

    // Nothing qualifies: fall back to the largest known short side.
    largest_index(candidates)
}

fn smallest_index(candidates: &[ThumbnailInfo]) -> Option<usize> {
    let all: Vec<usize> = (0..candidates.len()).collect();
    smallest_among(candidates, &all, false)
}

/// Smallest by short side among `indices`; when `prefer_known` is false and
/// dimensions are unknown, falls back to byte length. Ties break by the
/// first index encountered (insertion order).
fn smallest_among(candidates: &[ThumbnailInfo], indices: &[usize], prefer_known: bool) -> Option<usize> {
    let mut best: Option<(usize, u64)> = None;
    for &i in indices {
        let key = match candidates[i].short_side() {
            Some(side) => side as u64,
            None if prefer_known => u64::MAX, // unknowns sort last among "known qualifying"
            None => candidates[i].byte_length,
        };
        match best {
            None => best = Some((i, key)),
            Some((_, best_key)) if key < best_key => best = Some((i, key)),
            _ => {}
        }
    }
    best.map(|(i, _)| i)
}

fn largest_index(candidates: &[ThumbnailInfo]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, c) in candidates.iter().enumerate() {
        if let Some(side) = c.short_side() {
            match best {
                None => best = Some((i, side)),
                Some((_, best_side)) if side > best_side => best = Some((i, side)),
                _ => {}
            }
        }
    }
    if best.is_some() {
        return best.map(|(i, _)| i);
    }
    // No candidate has known dimensions at all -- fall back to byte length order.
    candidates
        .iter()
        .enumerate()
        .max_by_key(|(_, c)| c.byte_length)
        .map(|(i, _)| i)
}
