// Target memory access
//
// Reads and writes go through a pair of remote objects: an address object
// naming where, and a buffer object carrying the bytes. Scalar helpers wrap
// the raw byte transfers with the target's little-endian layout. A memory
// bundle batches several regions into one remote transfer.

use crate::address::Address;
use crate::debugger::Debugger;
use crate::error::{status, Error, Result};
use crate::handle::HandleKind;

impl Debugger {
    /// Read `length` bytes starting at `address`.
    pub fn memory_read(&self, address: &Address, length: usize) -> Result<Vec<u8>> {
        let mut link = self.channel().bind();
        link.with_obj(HandleKind::Buffer(length), |link, buffer| {
            link.with_obj(HandleKind::Address, |link, addr| {
                link.load_address(addr, address)?;
                status(link.transport().read_memory_obj(buffer, addr, length))
            })?;
            status(link.transport().copy_data_from_buffer(buffer, length))
        })
    }

    /// Write `data` starting at `address`.
    pub fn memory_write(&self, address: &Address, data: &[u8]) -> Result<()> {
        let mut link = self.channel().bind();
        link.with_obj(HandleKind::Buffer(data.len()), |link, buffer| {
            status(link.transport().copy_data_to_buffer(buffer, data))?;
            link.with_obj(HandleKind::Address, |link, addr| {
                link.load_address(addr, address)?;
                status(link.transport().write_memory_obj(buffer, addr, data.len()))
            })
        })
    }

    pub fn memory_read_u8(&self, address: &Address) -> Result<u8> {
        Ok(self.memory_read_array::<1>(address)?[0])
    }

    pub fn memory_read_u32(&self, address: &Address) -> Result<u32> {
        Ok(u32::from_le_bytes(self.memory_read_array(address)?))
    }

    pub fn memory_read_u64(&self, address: &Address) -> Result<u64> {
        Ok(u64::from_le_bytes(self.memory_read_array(address)?))
    }

    pub fn memory_read_f64(&self, address: &Address) -> Result<f64> {
        Ok(f64::from_le_bytes(self.memory_read_array(address)?))
    }

    pub fn memory_write_u8(&self, address: &Address, value: u8) -> Result<()> {
        self.memory_write(address, &[value])
    }

    pub fn memory_write_u32(&self, address: &Address, value: u32) -> Result<()> {
        self.memory_write(address, &value.to_le_bytes())
    }

    pub fn memory_write_u64(&self, address: &Address, value: u64) -> Result<()> {
        self.memory_write(address, &value.to_le_bytes())
    }

    pub fn memory_write_f64(&self, address: &Address, value: f64) -> Result<()> {
        self.memory_write(address, &value.to_le_bytes())
    }

    fn memory_read_array<const N: usize>(&self, address: &Address) -> Result<[u8; N]> {
        let bytes = self.memory_read(address, N)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Decode(format!("short memory read, wanted {N} bytes")))
    }

    /// Execute every region of a bundle in one remote transfer. Read regions
    /// get their data filled in; all regions get their sync flag set from
    /// the transfer result.
    pub fn memory_transfer(&self, bundle: &mut MemoryBundle) -> Result<()> {
        let count = bundle.regions.len();
        if count == 0 {
            return Ok(());
        }
        let mut link = self.channel().bind();
        link.with_obj(HandleKind::MemoryBundle(count), |link, handle| {
            for region in &bundle.regions {
                link.with_obj(HandleKind::Address, |link, addr| {
                    link.load_address(addr, &region.address)?;
                    match &region.op {
                        RegionOp::Read { length } => status(
                            link.transport().bundle_add_read(handle, addr, *length as u32),
                        ),
                        RegionOp::Write { data } => {
                            status(link.transport().bundle_add_write(handle, addr, data))
                        }
                    }
                })?;
            }
            status(link.transport().transfer_bundle_obj(handle))?;
            for (index, region) in bundle.regions.iter_mut().enumerate() {
                region.synced = status(link.transport().bundle_sync_ok(handle, index))?;
                if let RegionOp::Read { length } = &region.op {
                    region.data = if region.synced {
                        Some(status(
                            link.transport().bundle_data_by_index(handle, index, *length),
                        )?)
                    } else {
                        None
                    };
                }
            }
            Ok(())
        })
    }
}

/// Batch of memory regions transferred in a single remote operation.
#[derive(Debug, Clone, Default)]
pub struct MemoryBundle {
    regions: Vec<Region>,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub address: Address,
    op: RegionOp,
    /// Data read back; `None` until transferred (or when the region failed).
    pub data: Option<Vec<u8>>,
    /// Whether the region transferred successfully.
    pub synced: bool,
}

#[derive(Debug, Clone)]
enum RegionOp {
    Read { length: usize },
    Write { data: Vec<u8> },
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read(&mut self, address: Address, length: usize) {
        self.regions.push(Region {
            address,
            op: RegionOp::Read { length },
            data: None,
            synced: false,
        });
    }

    pub fn add_write(&mut self, address: Address, data: Vec<u8>) {
        self.regions.push(Region {
            address,
            op: RegionOp::Write { data },
            data: None,
            synced: false,
        });
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_accumulates_regions() {
        let mut bundle = MemoryBundle::new();
        assert!(bundle.is_empty());
        bundle.add_read(Address::new(0x1000), 4);
        bundle.add_write(Address::new(0x2000), vec![1, 2, 3]);
        assert_eq!(bundle.len(), 2);
        assert!(!bundle.regions()[0].synced);
    }
}
