//! Flash backend interface and the in-memory NOR simulator used by tests
//! and host-side tooling.

/// Raw flash primitives this module is allowed to use.
///
/// Both mutating calls are blocking and atomic per call: they either fully
/// complete or leave the array no worse than before. `store` follows NOR
/// semantics and may only clear bits relative to the current content; the
/// entry store never asks it to set a bit that is already 0.
pub trait FlashBackend {
    /// Erase one full page, setting every bit to 1.
    fn erase(&mut self, page_addr: u32, page_size: usize);

    /// Program `data.len()` bytes at a word-aligned address.
    fn store(&mut self, addr: u32, data: &[u8]);

    /// Memory-mapped read. Raw flash is directly addressable on the
    /// target; simulators return a slice of their backing buffer.
    fn read(&self, addr: u32, len: usize) -> &[u8];
}

impl<F: FlashBackend> FlashBackend for &mut F {
    fn erase(&mut self, page_addr: u32, page_size: usize) {
        (**self).erase(page_addr, page_size)
    }

    fn store(&mut self, addr: u32, data: &[u8]) {
        (**self).store(addr, data)
    }

    fn read(&self, addr: u32, len: usize) -> &[u8] {
        (**self).read(addr, len)
    }
}

/// RAM buffer standing in for the NOR array.
///
/// `store` is defined as a bitwise AND of new and old content, so any
/// attempt to set a cleared bit silently has no effect, exactly like the
/// real part. Tests reach through `bytes_mut` to inject corruption and
/// simulated power loss.
#[derive(Debug)]
pub struct MemFlash {
    base: u32,
    cells: Vec<u8>,
}

impl MemFlash {
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            cells: vec![0xFF; size],
        }
    }

    fn index(&self, addr: u32) -> usize {
        debug_assert!(addr >= self.base);
        (addr - self.base) as usize
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn bytes(&self) -> &[u8] {
        &self.cells
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }
}

impl FlashBackend for MemFlash {
    fn erase(&mut self, page_addr: u32, page_size: usize) {
        let start = self.index(page_addr);
        self.cells[start..start + page_size].fill(0xFF);
    }

    fn store(&mut self, addr: u32, data: &[u8]) {
        debug_assert_eq!(addr % 4, 0);
        let start = self.index(addr);
        for (cell, byte) in self.cells[start..start + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
    }

    fn read(&self, addr: u32, len: usize) -> &[u8] {
        let start = self.index(addr);
        &self.cells[start..start + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erase_sets_all_ones() {
        let mut flash = MemFlash::new(0, 64);
        flash.store(0, &[0x00; 64]);
        flash.erase(0, 64);
        assert!(flash.bytes().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn store_only_clears_bits() {
        let mut flash = MemFlash::new(0x1000, 16);
        flash.store(0x1000, &[0xF0, 0x0F, 0xAA, 0x55]);
        let before = flash.bytes().to_vec();

        // Try to flip cleared bits back; the AND semantics must refuse.
        flash.store(0x1000, &[0xFF, 0xFF, 0x55, 0xAA]);
        for (b, a) in before.iter().zip(flash.bytes()) {
            assert_eq!(a & !b, 0, "a bit went from 0 to 1");
        }
        assert_eq!(&flash.bytes()[..4], &[0xF0, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn read_reflects_base_offset() {
        let mut flash = MemFlash::new(0x2000, 32);
        flash.store(0x2010, &[0x12, 0x34]);
        assert_eq!(flash.read(0x2010, 2), &[0x12, 0x34]);
    }
}
