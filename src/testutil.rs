//! Synthetic images for tests.

use zerocopy::IntoBytes;

use crate::dyld::{AddressSpace, ImageDirectory};
use crate::error::{Error, Result};
use crate::macho::*;

/// Builds a Mach-O header followed by a load command list.
#[derive(Debug, Default)]
pub struct ImageBuilder {
    flags: u32,
    commands: Vec<Vec<u8>>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: MachOFlags) -> Self {
        self.flags = flags.bits();
        self
    }

    pub fn segment(
        mut self,
        name: &str,
        vmaddr: u64,
        vmsize: u64,
        fileoff: u64,
        sections: &[(&str, u64, u64)],
    ) -> Self {
        let mut seg = SegmentCommand64::default();
        seg.set_name(name);
        seg.vmaddr = vmaddr;
        seg.vmsize = vmsize;
        seg.fileoff = fileoff;
        seg.filesize = vmsize;
        seg.nsects = sections.len() as u32;
        seg.cmdsize = (SegmentCommand64::SIZE + sections.len() * Section64::SIZE) as u32;

        let mut cmd = seg.as_bytes().to_vec();
        for &(sectname, addr, size) in sections {
            let mut sect = Section64::default();
            sect.set_name(sectname);
            sect.segname = seg.segname;
            sect.addr = addr;
            sect.size = size;
            cmd.extend_from_slice(sect.as_bytes());
        }

        self.commands.push(cmd);
        self
    }

    /// A `__TEXT` segment mapped from file offset 0.
    pub fn text_segment(self, vmaddr: u64, vmsize: u64, sections: &[(&str, u64, u64)]) -> Self {
        self.segment(SEG_TEXT, vmaddr, vmsize, 0, sections)
    }

    pub fn linkedit_segment(self, vmaddr: u64, vmsize: u64, fileoff: u64) -> Self {
        self.segment(SEG_LINKEDIT, vmaddr, vmsize, fileoff, &[])
    }

    pub fn function_starts(mut self, dataoff: u32, datasize: u32) -> Self {
        let cmd = LinkeditDataCommand {
            dataoff,
            datasize,
            ..Default::default()
        };
        self.commands.push(cmd.as_bytes().to_vec());
        self
    }

    /// An arbitrary command with the given payload after its 8-byte header.
    pub fn raw_command(mut self, cmd: u32, payload: &[u8]) -> Self {
        let cmdsize = (LoadCommand::SIZE + payload.len()) as u32;
        let mut bytes = LoadCommand { cmd, cmdsize }.as_bytes().to_vec();
        bytes.extend_from_slice(payload);
        self.commands.push(bytes);
        self
    }

    /// Returns the header and command list bytes.
    pub fn build(&self) -> Vec<u8> {
        let sizeofcmds: usize = self.commands.iter().map(Vec::len).sum();
        let header = MachHeader64 {
            magic: MH_MAGIC_64,
            cputype: CPU_TYPE_ARM64,
            cpusubtype: CPU_SUBTYPE_ARM64_ALL,
            filetype: MH_EXECUTE,
            ncmds: self.commands.len() as u32,
            sizeofcmds: sizeofcmds as u32,
            flags: self.flags,
            reserved: 0,
        };

        let mut data = header.as_bytes().to_vec();
        for cmd in &self.commands {
            data.extend_from_slice(cmd);
        }
        data
    }
}

/// An address space made of byte buffers placed at fixed addresses.
#[derive(Debug, Default)]
pub struct SyntheticSpace {
    regions: Vec<(u64, Vec<u8>)>,
}

impl SyntheticSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, addr: u64, bytes: Vec<u8>) -> Self {
        self.regions.push((addr, bytes));
        self
    }
}

impl AddressSpace for SyntheticSpace {
    fn read(&self, addr: u64, len: usize) -> Result<&[u8]> {
        for (start, bytes) in &self.regions {
            let Some(offset) = addr.checked_sub(*start) else {
                continue;
            };
            let offset = offset as usize;
            if offset <= bytes.len() && len <= bytes.len() - offset {
                return Ok(&bytes[offset..offset + len]);
            }
        }
        Err(Error::UnreadableMemory { addr, len })
    }
}

/// A fixed image list. A `None` base simulates an image unloaded mid-scan.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    images: Vec<(Option<u64>, String, i64)>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, base: u64, path: &str, slide: i64) -> Self {
        self.images.push((Some(base), path.to_string(), slide));
        self
    }

    pub fn unloaded(mut self, path: &str) -> Self {
        self.images.push((None, path.to_string(), 0));
        self
    }
}

impl ImageDirectory for FakeDirectory {
    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn image_base(&self, index: u32) -> Option<u64> {
        self.images.get(index as usize)?.0
    }

    fn image_path(&self, index: u32) -> Option<String> {
        Some(self.images.get(index as usize)?.1.clone())
    }

    fn image_relocation(&self, index: u32) -> i64 {
        self.images.get(index as usize).map_or(0, |image| image.2)
    }
}
