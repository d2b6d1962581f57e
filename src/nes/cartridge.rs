use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufReader, Cursor, Read, Seek, SeekFrom},
    path::Path,
};

use super::error::{ErrorCode, EventLog};
use super::mapper::{
    CHR_BANK_SIZE, MapRead, MapWrite, Mapper, MapperChip, Mirroring, PRG_BANK_SIZE,
    create_mapper, mapper_name,
};
use super::memory::{Memory, MemoryKind};

pub const HEADER_SIZE: usize = 16;
pub const TRAINER_SIZE: usize = 512;
const MAGIC: &[u8; 4] = b"NES\x1A";

/// The 16-byte iNES / NES 2.0 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    raw: [u8; HEADER_SIZE],
}

impl Header {
    pub fn parse(raw: [u8; HEADER_SIZE]) -> Result<Self> {
        if &raw[0..4] != MAGIC {
            return Err(ErrorCode::InvalidNesFormat
                .error("invalid iNES header magic, expected NES<EOF>"));
        }

        let header = Self { raw };
        if header.is_nes2() {
            if (raw[9] & 0x0F) == 0x0F || (raw[9] >> 4) == 0x0F {
                return Err(ErrorCode::InvalidNesFormat
                    .error("NES 2.0 exponent/multiplier ROM size encoding is not supported"));
            }
        } else if raw[11..16].iter().any(|&b| b != 0) {
            // Garbage in the tail usually means an old dumper tag overwrote flags 7-15.
            return Err(ErrorCode::InvalidNesFormat.error(format!(
                "reserved header bytes are not zero: {:02X?}",
                &raw[11..16]
            )));
        }
        Ok(header)
    }

    pub fn is_nes2(&self) -> bool {
        (self.raw[7] & 0x0C) == 0x08
    }

    pub fn prg_banks(&self) -> usize {
        let msb = if self.is_nes2() {
            (self.raw[9] & 0x0F) as usize
        } else {
            0
        };
        (msb << 8) | self.raw[4] as usize
    }

    pub fn chr_banks(&self) -> usize {
        let msb = if self.is_nes2() {
            (self.raw[9] >> 4) as usize
        } else {
            0
        };
        (msb << 8) | self.raw[5] as usize
    }

    pub fn mapper_id(&self) -> u16 {
        let id = ((self.raw[6] as u16) >> 4) | ((self.raw[7] as u16) & 0xF0);
        if self.is_nes2() {
            id | (((self.raw[8] as u16) & 0x0F) << 8)
        } else {
            id
        }
    }

    pub fn submapper_id(&self) -> u8 {
        if self.is_nes2() { self.raw[8] >> 4 } else { 0 }
    }

    pub fn mirroring(&self) -> Mirroring {
        if (self.raw[6] & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (self.raw[6] & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }

    pub fn has_battery(&self) -> bool {
        (self.raw[6] & 0x02) != 0
    }

    pub fn has_trainer(&self) -> bool {
        (self.raw[6] & 0x04) != 0
    }

    /// PRG-RAM size in bytes as declared by the header.
    pub fn prg_ram_size(&self) -> usize {
        if self.is_nes2() {
            let shift = self.raw[10] & 0x0F;
            if shift == 0 { 0 } else { 64usize << shift }
        } else {
            (self.raw[8].max(1) as usize) * 8 * 1024
        }
    }
}

/// A cartridge image. Construction runs the whole validation pipeline; on any
/// failure the cartridge is left invalid with no memory or mapper attached.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: Option<Header>,
    prg: Memory,
    chr: Memory,
    mapper: Option<MapperChip>,
    log: EventLog,
}

impl Cartridge {
    fn invalid(log: EventLog) -> Self {
        Self {
            header: None,
            prg: Memory::rom(0, log.clone()),
            chr: Memory::rom(0, log.clone()),
            mapper: None,
            log,
        }
    }

    /// Loads `path`, posting the failure category to `log` if it does not validate.
    pub fn open(path: &Path, log: EventLog) -> Self {
        match Self::try_open(path, log.clone()) {
            Ok(cart) => cart,
            Err(err) => {
                log.post_error(&err);
                Self::invalid(log)
            }
        }
    }

    pub fn try_open(path: &Path, log: EventLog) -> Result<Self> {
        let file = File::open(path)
            .map_err(|err| ErrorCode::FileCouldNotOpen.error(err))
            .with_context(|| format!("failed to open ROM: {}", path.display()))?;
        let cart = Self::try_from_reader(&mut BufReader::new(file), log)
            .with_context(|| format!("failed to load ROM: {}", path.display()))?;
        cart.log.note(format!(
            "Cartridge loaded from {}: {}",
            path.display(),
            cart.describe()
        ));
        Ok(cart)
    }

    pub fn from_bytes(bytes: &[u8], log: EventLog) -> Self {
        Self::from_reader(&mut Cursor::new(bytes), log)
    }

    pub fn from_reader<R: Read + Seek>(reader: &mut R, log: EventLog) -> Self {
        match Self::try_from_reader(reader, log.clone()) {
            Ok(cart) => cart,
            Err(err) => {
                log.post_error(&err);
                Self::invalid(log)
            }
        }
    }

    pub fn try_from_reader<R: Read + Seek>(reader: &mut R, log: EventLog) -> Result<Self> {
        let mut raw = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut raw)
            .map_err(|err| ErrorCode::FileReadError.error(err))
            .context("could not read iNES header")?;
        let header = Header::parse(raw)?;

        if header.has_trainer() {
            reader
                .seek(SeekFrom::Current(TRAINER_SIZE as i64))
                .map_err(|err| ErrorCode::FileSeekError.error(err))
                .context("could not skip trainer")?;
        }

        let prg_banks = header.prg_banks();
        if prg_banks == 0 {
            return Err(ErrorCode::InvalidNesFormat.error("header declares no PRG ROM"));
        }
        let prg_size = prg_banks * PRG_BANK_SIZE;
        let mut prg = Memory::rom(0, log.clone());
        prg.resize(prg_size)?;
        prg.load_from(reader, prg_size)
            .context("could not load PRG ROM")?;

        let chr = match header.chr_banks() {
            0 => Memory::ram(CHR_BANK_SIZE, log.clone()),
            banks => {
                let chr_size = banks * CHR_BANK_SIZE;
                let mut chr = Memory::rom(0, log.clone());
                chr.resize(chr_size)?;
                chr.load_from(reader, chr_size)
                    .context("could not load CHR ROM")?;
                chr
            }
        };

        let mapper = create_mapper(header.mapper_id(), prg_banks, &log)?;

        Ok(Self {
            header: Some(header),
            prg,
            chr,
            mapper: Some(mapper),
            log,
        })
    }

    pub fn is_valid_image(&self) -> bool {
        self.mapper.is_some()
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn mapper_id(&self) -> Option<u16> {
        self.header.map(|h| h.mapper_id())
    }

    pub fn mirroring(&self) -> Option<Mirroring> {
        self.header.map(|h| h.mirroring())
    }

    pub fn is_prg_mirrored(&self) -> bool {
        self.header.is_some_and(|h| h.prg_banks() == 1)
    }

    pub fn is_chr_ram(&self) -> bool {
        self.header.is_some() && self.chr.kind() == MemoryKind::Ram
    }

    pub fn prg_rom(&self) -> &[u8] {
        self.prg.as_slice()
    }

    pub fn chr_data(&self) -> &[u8] {
        self.chr.as_slice()
    }

    pub fn describe(&self) -> String {
        let Some(header) = self.header else {
            return "invalid image".to_string();
        };
        let mapper_id = header.mapper_id();
        let mut out = format!(
            "{} (mapper {mapper_id}), PRG {}K, CHR {}K{}, {:?} mirroring",
            mapper_name(mapper_id),
            self.prg.len() / 1024,
            self.chr.len() / 1024,
            if self.is_chr_ram() { " RAM" } else { "" },
            header.mirroring(),
        );
        match header.prg_ram_size() {
            0 => {}
            size if size >= 1024 => out.push_str(&format!(", PRG-RAM {}K", size / 1024)),
            size => out.push_str(&format!(", PRG-RAM {size}B")),
        }
        if header.has_battery() {
            out.push_str(", battery");
        }
        if header.is_nes2() {
            out.push_str(&format!(", NES 2.0 submapper {}", header.submapper_id()));
        }
        out
    }

    pub fn debug_mapper_state(&self) -> String {
        self.mapper
            .as_ref()
            .map(|mapper| mapper.debug_state())
            .unwrap_or_else(|| "No mapper".to_string())
    }

    /// CPU-side read. `None` when the cartridge does not claim `addr`.
    pub fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        match self.mapper.as_mut()?.map_read(addr) {
            MapRead::Prg(offset) => Some(self.prg.read(offset)),
            MapRead::Data(value) => Some(value),
            MapRead::Unmapped => None,
        }
    }

    /// CPU-side write. Returns whether the cartridge claimed `addr`.
    pub fn cpu_write(&mut self, addr: u16, value: u8) -> bool {
        let Some(mapper) = self.mapper.as_mut() else {
            return false;
        };
        match mapper.map_write(addr, value) {
            MapWrite::Prg(offset) => {
                self.prg.write(offset, value);
                true
            }
            MapWrite::Handled => true,
            MapWrite::Unmapped => false,
        }
    }

    pub fn ppu_read(&mut self, addr: u16) -> Option<u8> {
        let offset = self.mapper.as_ref()?.map_ppu(addr)?;
        Some(self.chr.read(offset))
    }

    pub fn ppu_write(&mut self, addr: u16, value: u8) -> bool {
        let Some(offset) = self.mapper.as_ref().and_then(|m| m.map_ppu(addr)) else {
            return false;
        };
        self.chr.write(offset, value);
        true
    }
}
