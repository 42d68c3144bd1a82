//! Single-pass load command scanner.
//!
//! Walks an image's load commands once with a byte cursor and pulls out the
//! three things function-starts recovery needs: the `__LINKEDIT` segment, the
//! `__TEXT,__text` section and the `LC_FUNCTION_STARTS` descriptor. All
//! runtime addresses are relocated by the image's slide.

use tracing::debug;
use zerocopy::FromBytes;

use super::constants::*;
use super::structs::*;
use crate::error::{Error, Result};
use crate::util::read_u32_le_at;

// =============================================================================
// Regions
// =============================================================================

/// The loader-metadata segment, relocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkeditRegion {
    /// Runtime address of the first byte of `__LINKEDIT`
    pub runtime_start: u64,
    /// `runtime_start + vmsize`
    pub runtime_end: u64,
    /// Unrelocated file offset corresponding to `runtime_start`
    pub file_offset: u64,
}

/// The `__TEXT,__text` section, relocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRegion {
    /// Runtime address of the first instruction byte
    pub runtime_start: u64,
    /// One past the last instruction byte
    pub runtime_end: u64,
}

impl CodeRegion {
    /// Returns true if `addr` lies in `[runtime_start, runtime_end)`.
    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.runtime_start && addr < self.runtime_end
    }
}

/// Location of the encoded function-starts data, as recorded by the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionStartsTable {
    /// File offset of the table (inside `__LINKEDIT`)
    pub file_offset: u64,
    /// Size of the table in bytes
    pub size: u64,
}

/// Everything the scanner extracted from one image's load commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageLayout {
    /// Runtime start of the `__TEXT` segment; function offsets count from here
    pub text_segment_start: Option<u64>,
    /// The `__text` section
    pub code: Option<CodeRegion>,
    /// The `__LINKEDIT` segment
    pub linkedit: Option<LinkeditRegion>,
    /// The `LC_FUNCTION_STARTS` descriptor, if the image has one
    pub function_starts: Option<FunctionStartsTable>,
}

// =============================================================================
// Header
// =============================================================================

/// Parses and validates a 64-bit Mach-O header from the start of `data`.
pub fn read_header(data: &[u8]) -> Result<MachHeader64> {
    let header = MachHeader64::read_from_prefix(data)
        .map_err(|_| Error::buffer_too_small(MachHeader64::SIZE, data.len()))?
        .0;

    if !header.is_valid() {
        return Err(Error::InvalidMachoMagic(header.magic));
    }

    Ok(header)
}

// =============================================================================
// Scanner
// =============================================================================

/// Scans the load command list that follows `header`.
///
/// `commands` must be exactly the `sizeofcmds` bytes after the header. Every
/// step of the walk is bounds-checked against that length. Offsets in errors
/// are relative to the start of the header, matching the on-disk layout.
pub fn scan_load_commands(
    header: &MachHeader64,
    commands: &[u8],
    slide: i64,
) -> Result<ImageLayout> {
    let mut scanner = Scanner {
        slide,
        layout: ImageLayout::default(),
    };

    let total = commands.len();
    let mut cursor = 0usize;

    for _ in 0..header.ncmds {
        let offset = MachHeader64::SIZE + cursor;

        if total - cursor < LoadCommand::SIZE {
            return Err(Error::LoadCommandOverflow {
                offset,
                sizeofcmds: header.sizeofcmds,
            });
        }

        let cmd = read_u32_le_at(commands, cursor);
        let cmdsize = read_u32_le_at(commands, cursor + 4);

        if (cmdsize as usize) < LoadCommand::SIZE {
            return Err(Error::InvalidCommandSize { offset, cmdsize });
        }
        if cmdsize as usize > total - cursor {
            return Err(Error::LoadCommandOverflow {
                offset,
                sizeofcmds: header.sizeofcmds,
            });
        }

        let cmd_data = &commands[cursor..cursor + cmdsize as usize];
        match cmd {
            LC_SEGMENT_64 => scanner.segment(cmd_data, offset)?,
            LC_FUNCTION_STARTS => scanner.function_starts(cmd_data, offset)?,
            _ => {}
        }

        cursor += cmdsize as usize;
    }

    Ok(scanner.layout)
}

struct Scanner {
    slide: i64,
    layout: ImageLayout,
}

impl Scanner {
    fn segment(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let seg = SegmentCommand64::read_from_prefix(data)
            .map_err(|_| Error::InvalidCommandSize {
                offset,
                cmdsize: data.len() as u32,
            })?
            .0;

        let needed = (seg.nsects as u64) * Section64::SIZE as u64 + SegmentCommand64::SIZE as u64;
        if needed > data.len() as u64 {
            return Err(Error::SectionsOverflow {
                segment: seg.name().to_string(),
                offset,
                nsects: seg.nsects,
                cmdsize: seg.cmdsize,
            });
        }

        match seg.name() {
            SEG_LINKEDIT => {
                if self.layout.linkedit.is_some() {
                    debug!("ignoring duplicate {} at offset {:#x}", SEG_LINKEDIT, offset);
                    return Ok(());
                }
                debug!("{}", seg);
                let runtime_start = self.relocate(seg.vmaddr, seg.name())?;
                let runtime_end = runtime_start
                    .checked_add(seg.vmsize)
                    .ok_or_else(|| Error::SegmentBoundsOverflow {
                        segment: seg.name().to_string(),
                    })?;
                self.layout.linkedit = Some(LinkeditRegion {
                    runtime_start,
                    runtime_end,
                    file_offset: seg.fileoff,
                });
            }
            SEG_TEXT => {
                if self.layout.text_segment_start.is_some() {
                    debug!("ignoring duplicate {} at offset {:#x}", SEG_TEXT, offset);
                    return Ok(());
                }
                debug!("{}", seg);
                self.layout.text_segment_start = Some(self.relocate(seg.vmaddr, seg.name())?);
                self.layout.code = self.code_section(&seg, data)?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Finds the first `__text` section of the code segment.
    fn code_section(&self, seg: &SegmentCommand64, data: &[u8]) -> Result<Option<CodeRegion>> {
        let sections = &data[SegmentCommand64::SIZE..];

        for chunk in sections.chunks_exact(Section64::SIZE).take(seg.nsects as usize) {
            let Ok((section, _)) = Section64::read_from_prefix(chunk) else {
                continue;
            };
            if section.name() != SECT_TEXT {
                continue;
            }

            debug!("{}", section);
            let runtime_start = self.relocate(section.addr, seg.name())?;
            let runtime_end = runtime_start
                .checked_add(section.size)
                .ok_or_else(|| Error::SegmentBoundsOverflow {
                    segment: seg.name().to_string(),
                })?;
            return Ok(Some(CodeRegion {
                runtime_start,
                runtime_end,
            }));
        }

        debug!("{} has no {} section", SEG_TEXT, SECT_TEXT);
        Ok(None)
    }

    fn function_starts(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let led = LinkeditDataCommand::read_from_prefix(data)
            .map_err(|_| Error::InvalidCommandSize {
                offset,
                cmdsize: data.len() as u32,
            })?
            .0;

        // The table is located relative to __LINKEDIT, so it must already be known.
        if self.layout.linkedit.is_none() {
            return Err(Error::FunctionStartsBeforeLinkedit { offset });
        }

        if self.layout.function_starts.is_some() {
            debug!("ignoring duplicate LC_FUNCTION_STARTS at offset {:#x}", offset);
            return Ok(());
        }

        self.layout.function_starts = Some(FunctionStartsTable {
            file_offset: led.dataoff as u64,
            size: led.datasize as u64,
        });
        Ok(())
    }

    #[inline]
    fn relocate(&self, vmaddr: u64, segment: &str) -> Result<u64> {
        vmaddr
            .checked_add_signed(self.slide)
            .ok_or_else(|| Error::SegmentBoundsOverflow {
                segment: segment.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ImageBuilder;

    fn scan(image: &[u8], slide: i64) -> Result<ImageLayout> {
        let header = read_header(image)?;
        let end = MachHeader64::SIZE + header.sizeofcmds as usize;
        scan_load_commands(&header, &image[MachHeader64::SIZE..end], slide)
    }

    #[test]
    fn test_scan_typical_image() {
        let image = ImageBuilder::new()
            .text_segment(0x1_0000_0000, 0x4000, &[("__text", 0x1_0000_1000, 0x2000)])
            .linkedit_segment(0x1_0000_8000, 0x1000, 0x8000)
            .function_starts(0x8010, 0x20)
            .build();

        let layout = scan(&image, 0x10_0000).unwrap();

        assert_eq!(layout.text_segment_start, Some(0x1_0010_0000));
        assert_eq!(
            layout.code,
            Some(CodeRegion {
                runtime_start: 0x1_0010_1000,
                runtime_end: 0x1_0010_3000,
            })
        );
        assert_eq!(
            layout.linkedit,
            Some(LinkeditRegion {
                runtime_start: 0x1_0010_8000,
                runtime_end: 0x1_0010_9000,
                file_offset: 0x8000,
            })
        );
        assert_eq!(
            layout.function_starts,
            Some(FunctionStartsTable {
                file_offset: 0x8010,
                size: 0x20,
            })
        );
    }

    #[test]
    fn test_negative_slide() {
        let image = ImageBuilder::new()
            .text_segment(0x2000, 0x1000, &[("__text", 0x2400, 0x100)])
            .build();

        let layout = scan(&image, -0x1000).unwrap();
        assert_eq!(layout.text_segment_start, Some(0x1000));
        assert_eq!(layout.code.unwrap().runtime_start, 0x1400);
    }

    #[test]
    fn test_missing_function_starts_is_not_an_error() {
        let image = ImageBuilder::new()
            .text_segment(0x1000, 0x1000, &[("__text", 0x1000, 0x1000)])
            .linkedit_segment(0x3000, 0x1000, 0x3000)
            .build();

        let layout = scan(&image, 0).unwrap();
        assert!(layout.function_starts.is_none());
        assert!(layout.linkedit.is_some());
    }

    #[test]
    fn test_function_starts_before_linkedit() {
        let image = ImageBuilder::new()
            .text_segment(0x1000, 0x1000, &[("__text", 0x1000, 0x1000)])
            .function_starts(0x3000, 0x10)
            .linkedit_segment(0x3000, 0x1000, 0x3000)
            .build();

        let err = scan(&image, 0).unwrap_err();
        assert!(matches!(err, Error::FunctionStartsBeforeLinkedit { .. }));
    }

    #[test]
    fn test_first_segment_wins() {
        let image = ImageBuilder::new()
            .text_segment(0x1000, 0x1000, &[("__stubs", 0x1000, 0x10), ("__text", 0x1100, 0x100)])
            .text_segment(0x9000, 0x1000, &[("__text", 0x9000, 0x100)])
            .linkedit_segment(0x3000, 0x1000, 0x3000)
            .linkedit_segment(0x5000, 0x1000, 0x5000)
            .build();

        let layout = scan(&image, 0).unwrap();
        assert_eq!(layout.text_segment_start, Some(0x1000));
        assert_eq!(layout.code.unwrap().runtime_start, 0x1100);
        assert_eq!(layout.linkedit.unwrap().runtime_start, 0x3000);
    }

    #[test]
    fn test_first_text_section_wins() {
        let image = ImageBuilder::new()
            .text_segment(0x1000, 0x1000, &[("__text", 0x1000, 0x80), ("__text", 0x1080, 0x80)])
            .build();

        let layout = scan(&image, 0).unwrap();
        assert_eq!(layout.code.unwrap().runtime_end, 0x1080);
    }

    #[test]
    fn test_text_section_only_taken_from_code_segment() {
        let image = ImageBuilder::new()
            .segment("__DATA", 0x4000, 0x1000, 0x4000, &[("__text", 0x4000, 0x100)])
            .text_segment(0x1000, 0x1000, &[("__cstring", 0x1000, 0x100)])
            .build();

        let layout = scan(&image, 0).unwrap();
        assert!(layout.code.is_none());
        assert_eq!(layout.text_segment_start, Some(0x1000));
    }

    #[test]
    fn test_command_overflowing_list() {
        let mut image = ImageBuilder::new()
            .text_segment(0x1000, 0x1000, &[])
            .build();
        // Grow the segment's cmdsize past sizeofcmds.
        let cmdsize_at = MachHeader64::SIZE + 4;
        image[cmdsize_at..cmdsize_at + 4].copy_from_slice(&0x400u32.to_le_bytes());

        let err = scan(&image, 0).unwrap_err();
        assert!(matches!(err, Error::LoadCommandOverflow { offset: 32, .. }));
    }

    #[test]
    fn test_zero_sized_command() {
        let mut image = ImageBuilder::new().raw_command(0x1B, &[]).build();
        let cmdsize_at = MachHeader64::SIZE + 4;
        image[cmdsize_at..cmdsize_at + 4].copy_from_slice(&0u32.to_le_bytes());

        let err = scan(&image, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidCommandSize { cmdsize: 0, .. }));
    }

    #[test]
    fn test_ncmds_exceeds_list() {
        let mut image = ImageBuilder::new()
            .text_segment(0x1000, 0x1000, &[])
            .build();
        // Claim a second command that isn't there.
        image[16..20].copy_from_slice(&2u32.to_le_bytes());

        let err = scan(&image, 0).unwrap_err();
        assert!(matches!(err, Error::LoadCommandOverflow { .. }));
    }

    #[test]
    fn test_sections_overflow_segment() {
        let mut image = ImageBuilder::new()
            .text_segment(0x1000, 0x1000, &[("__text", 0x1000, 0x10)])
            .build();
        // nsects lives at offset 64 of the segment command.
        let nsects_at = MachHeader64::SIZE + 64;
        image[nsects_at..nsects_at + 4].copy_from_slice(&5u32.to_le_bytes());

        let err = scan(&image, 0).unwrap_err();
        assert!(matches!(err, Error::SectionsOverflow { nsects: 5, .. }));
    }

    #[test]
    fn test_unknown_commands_are_skipped() {
        let image = ImageBuilder::new()
            .raw_command(0x1B, &[0u8; 16])
            .text_segment(0x1000, 0x1000, &[("__text", 0x1000, 0x10)])
            .raw_command(0x2A, &[0u8; 8])
            .build();

        let layout = scan(&image, 0).unwrap();
        assert!(layout.code.is_some());
    }

    #[test]
    fn test_invalid_magic() {
        let mut image = ImageBuilder::new().build();
        image[..4].copy_from_slice(&0xFEEDFACEu32.to_le_bytes());
        assert!(matches!(
            read_header(&image),
            Err(Error::InvalidMachoMagic(0xFEEDFACE))
        ));
    }
}
