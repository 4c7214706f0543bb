// ---------------------------------------------------------------------------
// Order Randomizer
// ---------------------------------------------------------------------------
//
// The backend does not guarantee unbiased ordering, so every freshly
// fetched page gets a uniform Fisher-Yates shuffle at ingestion — exactly
// once, before caching, never on read.
// ---------------------------------------------------------------------------

use rand::seq::SliceRandom;

use crate::types::Item;

/// Shuffle a page in place with a fresh uniform permutation.
pub fn shuffle_page(items: &mut [Item]) {
    items.shuffle(&mut rand::rng());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
