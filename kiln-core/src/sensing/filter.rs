//! Moving-average filters for ADC readings
//!
//! A filter keeps the last `N` raw samples and their running sum. It is
//! owned by the acquisition interrupt; readers in the foreground see only
//! the copy published into a [`FilterCell`].

use portable_atomic::{AtomicU32, Ordering};

/// Fixed-depth moving average of 12-bit readings
///
/// `N` must be a power of two. The sum of `N` 12-bit samples must fit in 31
/// bits so it can be published together with the valid flag.
#[derive(Debug, Clone)]
pub struct AveragingFilter<const N: usize> {
    readings: [u16; N],
    index: usize,
    sum: u32,
    valid: bool,
}

impl<const N: usize> AveragingFilter<N> {
    const DEPTH_OK: () = assert!(
        N.is_power_of_two() && (N as u64) * 4096 <= FilterCell::SUM_MASK as u64,
        "filter depth must be a power of two small enough for a 31-bit sum"
    );

    /// Create a filter filled with zero readings
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::DEPTH_OK;
        Self {
            readings: [0; N],
            index: 0,
            sum: 0,
            valid: false,
        }
    }

    /// Fill every slot with `initial` and mark the filter not yet valid
    pub fn init(&mut self, initial: u16) {
        self.readings = [initial; N];
        self.sum = initial as u32 * N as u32;
        self.index = 0;
        self.valid = false;
    }

    /// Replace the oldest sample with `reading`
    ///
    /// The filter becomes valid once `N` samples have been processed since
    /// the last [`AveragingFilter::init`].
    pub fn process_reading(&mut self, reading: u16) {
        self.sum = self.sum - self.readings[self.index] as u32 + reading as u32;
        self.readings[self.index] = reading;
        self.index = (self.index + 1) & (N - 1);
        if self.index == 0 {
            self.valid = true;
        }
    }

    /// Sum of the last `N` samples
    pub fn sum(&self) -> u32 {
        self.sum
    }

    /// Whether `N` samples have been seen since the last init
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Depth of the filter
    pub const fn depth(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for AveragingFilter<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Published filter state, readable from any context
///
/// Sum and valid flag share one atomic word (valid in bit 31) so a reader
/// never sees a sum paired with the wrong validity.
#[derive(Debug)]
pub struct FilterCell(AtomicU32);

impl FilterCell {
    const VALID_BIT: u32 = 1 << 31;
    const SUM_MASK: u32 = !Self::VALID_BIT;

    /// An invalid, zero-sum cell
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Publish the current state of `filter`
    pub fn publish<const N: usize>(&self, filter: &AveragingFilter<N>) {
        self.store(filter.sum(), filter.is_valid());
    }

    /// Publish a sum and validity
    pub fn store(&self, sum: u32, valid: bool) {
        let word = (sum & Self::SUM_MASK) | if valid { Self::VALID_BIT } else { 0 };
        self.0.store(word, Ordering::Release);
    }

    /// Read sum and validity as one snapshot
    pub fn load(&self) -> (u32, bool) {
        let word = self.0.load(Ordering::Acquire);
        (word & Self::SUM_MASK, word & Self::VALID_BIT != 0)
    }

    /// Last published sum
    pub fn sum(&self) -> u32 {
        self.load().0
    }

    /// Last published validity
    pub fn is_valid(&self) -> bool {
        self.load().1
    }
}

impl Default for FilterCell {
    fn default() -> Self {
        Self::new()
    }
}
