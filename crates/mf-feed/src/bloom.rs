//! # Membership Filter
//!
//! A Bloom filter over post ids answering "could this post exist?".
//! A `false` answer is definitive and lets callers skip the durable-store
//! lookup; a `true` answer still needs confirmation.
//!
//! The filter only grows. Posts are never deleted, so there is no removal;
//! if that ever changes the filter has to be rebuilt wholesale with
//! [`MembershipFilter::rebuild`], since a plain Bloom filter cannot forget
//! a single element.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock};

use mf_core::models::PostId;
use mf_core::settings::BloomSettings;

/// Fixed-size bit array plus the hash count chosen at construction.
#[derive(Debug, Clone)]
struct BloomBits {
    words: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomBits {
    /// Standard sizing: m = -n ln p / (ln 2)^2, k = m/n ln 2.
    fn with_estimates(capacity: usize, false_positive_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 32.0) as u32;

        Self {
            words: vec![0; num_bits.div_ceil(64) as usize],
            num_bits,
            num_hashes,
        }
    }

    fn hash_with(id: PostId, seed: u64) -> u64 {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        id.hash(&mut hasher);
        hasher.finish()
    }

    /// Kirsch-Mitzenmacher double hashing: g_i = h1 + i * h2.
    fn positions(&self, id: PostId) -> impl Iterator<Item = u64> + '_ {
        let h1 = Self::hash_with(id, 0x51_7c_c1_b7_27_22_0a_95);
        let h2 = Self::hash_with(id, 0x9e_37_79_b9_7f_4a_7c_15) | 1;
        (0..u64::from(self.num_hashes)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }

    fn insert(&mut self, id: PostId) {
        let positions: Vec<u64> = self.positions(id).collect();
        for bit in positions {
            self.words[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    fn contains(&self, id: PostId) -> bool {
        self.positions(id)
            .all(|bit| self.words[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }
}

/// Room for the seeded ids plus as many again before the rate degrades.
fn sized_capacity(configured: usize, seeded: usize) -> usize {
    if seeded > configured {
        configured.max(seeded.saturating_mul(2))
    } else {
        configured
    }
}

/// Process-wide post membership filter.
///
/// Readers share the lock; `register` takes it exclusively. An unseeded
/// filter (startup seeding failed) answers `true` for every id so it can
/// never produce a false negative.
#[derive(Debug)]
pub struct MembershipFilter {
    inner: RwLock<Option<BloomBits>>,
    settings: BloomSettings,
}

impl MembershipFilter {
    /// Empty filter sized for `settings.capacity` ids.
    pub fn new(settings: BloomSettings) -> Self {
        let bits = BloomBits::with_estimates(settings.capacity, settings.false_positive_rate);
        Self {
            inner: RwLock::new(Some(bits)),
            settings,
        }
    }

    /// Filter built from every known id.
    pub fn seeded<I>(settings: BloomSettings, ids: I) -> Self
    where
        I: IntoIterator<Item = PostId>,
    {
        let filter = Self::new(settings);
        filter.rebuild(ids);
        filter
    }

    /// A pass-through filter used when the id set could not be loaded.
    pub fn unseeded(settings: BloomSettings) -> Self {
        Self {
            inner: RwLock::new(None),
            settings,
        }
    }

    pub fn register(&self, id: PostId) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(bits) = guard.as_mut() {
            bits.insert(id);
        }
    }

    /// `false` means the id was never registered.
    pub fn may_exist(&self, id: PostId) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map_or(true, |bits| bits.contains(id))
    }

    /// Replaces the whole filter with one built from `ids`.
    ///
    /// The filter is sized for at least twice the seeded count, so a store
    /// that outgrew the configured capacity keeps its false-positive rate.
    pub fn rebuild<I>(&self, ids: I)
    where
        I: IntoIterator<Item = PostId>,
    {
        let ids: Vec<PostId> = ids.into_iter().collect();
        let capacity = sized_capacity(self.settings.capacity, ids.len());
        if capacity > self.settings.capacity {
            tracing::warn!(
                seeded = ids.len(),
                configured = self.settings.capacity,
                capacity,
                "membership filter capacity raised above configured value"
            );
        }

        let mut bits = BloomBits::with_estimates(capacity, self.settings.false_positive_rate);
        for &id in &ids {
            bits.insert(id);
        }
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(bits);
        tracing::debug!(count = ids.len(), capacity, "membership filter rebuilt");
    }

    pub fn is_seeded(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}
