//! Translates a `msg` pointer recorded at runtime into a string read from
//! the producer binary on disk.
//!
//! Parsing the binary with `goblin` produces borrowed structures tied to
//! the byte slice's lifetime; everything this module needs long-term
//! (segment bounds, the named LOC section's bytes) is copied out into plain
//! owned values before `build_*` returns, so `Decoder` can hold a resolver
//! without also holding a self-referential `goblin::elf::Elf`.

use crate::error::{DecodeError, StringError};
use nanolog_loc::NamedSectionOracle;

pub enum StringResolver {
    Elf { segments: Vec<ElfLoadSegment> },
    MachO { cstring: MachOSection },
}

pub struct ElfLoadSegment {
    vaddr: u64,
    filesz: u64,
    offset: u64,
}

pub struct MachOSection {
    addr: u64,
    size: u64,
    offset: u64,
}

pub fn build_elf_resolver(
    bytes: &[u8],
) -> Result<(StringResolver, Option<NamedSectionOracle>), DecodeError> {
    let elf = goblin::elf::Elf::parse(bytes).map_err(DecodeError::BinaryParse)?;

    let segments = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == goblin::elf::program_header::PT_LOAD)
        .map(|ph| ElfLoadSegment {
            vaddr: ph.p_vaddr,
            filesz: ph.p_filesz,
            offset: ph.p_offset,
        })
        .collect();

    let oracle = elf.section_headers.iter().find_map(|sh| {
        let name = elf.shdr_strtab.get_at(sh.sh_name)?;
        if name != nanolog_loc::LINUX_SECTION_NAME {
            return None;
        }
        let start = sh.sh_offset as usize;
        let end = start.checked_add(sh.sh_size as usize)?;
        bytes
            .get(start..end)
            .map(NamedSectionOracle::from_section_bytes)
    });

    Ok((StringResolver::Elf { segments }, oracle))
}

pub fn build_macho_resolver(
    bytes: &[u8],
) -> Result<(StringResolver, Option<NamedSectionOracle>), DecodeError> {
    let macho = match goblin::mach::Mach::parse(bytes).map_err(DecodeError::BinaryParse)? {
        goblin::mach::Mach::Binary(macho) => macho,
        goblin::mach::Mach::Fat(_) => {
            return Err(DecodeError::HeaderInvalid(
                "fat Mach-O binaries are not supported",
            ));
        }
    };

    let mut cstring = None;
    let mut named_section_bytes: Option<&[u8]> = None;

    for segment in &macho.segments {
        let sections = segment.sections().map_err(DecodeError::BinaryParse)?;
        for (section, data) in sections {
            let sectname = section.name().unwrap_or("");
            let segname = section.segname().unwrap_or("");
            if segname == "__TEXT" && sectname == "__cstring" {
                cstring = Some(MachOSection {
                    addr: section.addr,
                    size: section.size,
                    offset: section.offset as u64,
                });
            }
            if segname == "__DATA" && sectname == nanolog_loc::MACOS_SECTION_NAME {
                named_section_bytes = Some(data);
            }
        }
    }

    let cstring = cstring.ok_or(DecodeError::HeaderInvalid(
        "producer binary has no __TEXT,__cstring section",
    ))?;
    let oracle = named_section_bytes.map(NamedSectionOracle::from_section_bytes);

    Ok((StringResolver::MachO { cstring }, oracle))
}

/// Resolves one `msg` pointer into a string, given the producer's captured
/// load base and its binary's raw bytes.
pub fn resolve_string(
    resolver: &StringResolver,
    fbase: u64,
    msg_ptr: u64,
    producer_bytes: &[u8],
) -> Result<String, StringError> {
    let vaddr = msg_ptr.wrapping_sub(fbase);

    let file_offset = match resolver {
        StringResolver::Elf { segments } => segments
            .iter()
            .find(|s| vaddr >= s.vaddr && vaddr < s.vaddr + s.filesz)
            .map(|s| s.offset + (vaddr - s.vaddr)),
        StringResolver::MachO { cstring } => {
            if vaddr >= cstring.addr && vaddr < cstring.addr + cstring.size {
                Some(cstring.offset + (vaddr - cstring.addr))
            } else {
                None
            }
        }
    };

    let file_offset = file_offset.ok_or(StringError::Unresolved(msg_ptr))?;
    read_cstr_at(producer_bytes, file_offset as usize).ok_or(StringError::Unresolved(msg_ptr))
}

fn read_cstr_at(bytes: &[u8], offset: usize) -> Option<String> {
    let tail = bytes.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}
