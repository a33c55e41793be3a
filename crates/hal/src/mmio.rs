//! Ordered MMIO register access.
//!
//! Register sequences in the camera PHY are table driven: each entry is a
//! write followed by an optional settle delay, and the write must be globally
//! visible before the delay starts. Implementations back [`MmioRegion::write`]
//! with a store + barrier (`writel` with a memory barrier on Linux-class
//! platforms) and [`MmioRegion::delay_ms`] with a busy-wait sleep range.

/// A memory-mapped register block belonging to one hardware instance.
///
/// Offsets are byte offsets from the block base. All accesses are 32-bit.
pub trait MmioRegion: Send + Sync {
    /// Write `value` at `offset`. The write is globally visible when this
    /// returns.
    fn write(&self, offset: u32, value: u32);

    /// Read the register at `offset`.
    fn read(&self, offset: u32) -> u32;

    /// Block the calling thread for at least `ms` milliseconds. Not
    /// interruptible; callers only pass the small per-entry settle delays
    /// from the register tables.
    fn delay_ms(&self, ms: u32);

    /// Write followed by the table entry's settle delay. A zero delay is a
    /// plain write.
    fn write_settled(&self, offset: u32, value: u32, delay_ms: u32) {
        self.write(offset, value);
        if delay_ms > 0 {
            self.delay_ms(delay_ms);
        }
    }
}
