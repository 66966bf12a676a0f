use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use super::ExportError;
use crate::gpu::Logged;
use crate::logger::GpuLogger;

pub const METADATA_VERSION: u64 = 1;

/// A logged command as stored in the binary frame log.
///
/// Every field is stored in the host byte order, with 2 bytes of padding after `rot`
/// and 2 at the end, for a total of [`LogEntry::ENCODED_SIZE`] bytes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub frame: u32,
    pub pc: u32,
    pub gp0_cmd: u32,
    /// bits 24-31 of `gp0_cmd`
    pub primitive_type: u16,
    /// number of words of the command, may be larger than the words kept in `packet_words`
    pub word_count: u16,
    pub packet_words: [u32; 12],

    // from the GTE state attached to the command, input vertices and output
    // screen coordinates
    pub vx: [i16; 4],
    pub vy: [i16; 4],
    pub vz: [i16; 4],
    pub sx: [i16; 4],
    pub sy: [i16; 4],
    pub rot: [[i16; 3]; 3],
    pub translation: [i32; 3],
    pub ofx: i32,
    pub ofy: i32,
    pub h: i16,
    pub dqa: i16,
    pub dqb: i16,
    pub zsf3: i16,
    pub zsf4: i16,

    // reserved, always zero for now
    pub clut: u16,
    pub tpage: u16,
    pub u: [u8; 4],
    pub v: [u8; 4],
}

const LOG_ENTRY_FIELDS_SIZE: usize = 4 * 3 // frame, pc, gp0_cmd
    + 2 * 2 // primitive_type, word_count
    + 4 * 12 // packet_words
    + 2 * 4 * 5 // vx, vy, vz, sx, sy
    + 2 * 9 // rot
    + 2 // padding
    + 4 * 3 // translation
    + 4 * 2 // ofx, ofy
    + 2 * 5 // h, dqa, dqb, zsf3, zsf4
    + 2 * 2 // clut, tpage
    + 4 * 2 // u, v
    + 2; // padding

const _: () = assert!(LOG_ENTRY_FIELDS_SIZE == LogEntry::ENCODED_SIZE);

impl LogEntry {
    pub const ENCODED_SIZE: usize = 168;

    pub fn from_logged(logged: &Logged) -> Self {
        let words = logged.words();
        let gp0_cmd = words.first().copied().unwrap_or(0);

        let mut entry = Self {
            frame: logged.frame() as u32,
            pc: logged.pc(),
            gp0_cmd,
            primitive_type: ((gp0_cmd >> 24) & 0xFF) as u16,
            word_count: words.len() as u16,
            ..Self::default()
        };
        for (dst, src) in entry.packet_words.iter_mut().zip(words) {
            *dst = *src;
        }

        if let Some(state) = logged.gte_state() {
            let input = &state.input;
            let output = &state.output;

            for (i, vertex) in input.vertices.iter().enumerate().take(4) {
                entry.vx[i] = vertex[0];
                entry.vy[i] = vertex[1];
                entry.vz[i] = vertex[2];
            }
            for (i, coords) in output.screen_coords.iter().enumerate().take(4) {
                entry.sx[i] = coords[0];
                entry.sy[i] = coords[1];
            }
            entry.rot = input.rotation_matrix;
            entry.translation = input.translation;
            entry.ofx = input.offset_x;
            entry.ofy = input.offset_y;
            entry.h = input.projection_plane_distance;
            entry.dqa = input.depth_queue_a;
            // only the low 16 bits fit
            entry.dqb = input.depth_queue_b as i16;
            entry.zsf3 = input.depth_scale_factor3;
            entry.zsf4 = input.depth_scale_factor4;
        }

        entry
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<NativeEndian>(self.frame)?;
        writer.write_u32::<NativeEndian>(self.pc)?;
        writer.write_u32::<NativeEndian>(self.gp0_cmd)?;
        writer.write_u16::<NativeEndian>(self.primitive_type)?;
        writer.write_u16::<NativeEndian>(self.word_count)?;
        for word in self.packet_words {
            writer.write_u32::<NativeEndian>(word)?;
        }
        for array in [&self.vx, &self.vy, &self.vz, &self.sx, &self.sy] {
            for v in array {
                writer.write_i16::<NativeEndian>(*v)?;
            }
        }
        for v in self.rot.iter().flatten() {
            writer.write_i16::<NativeEndian>(*v)?;
        }
        writer.write_u16::<NativeEndian>(0)?;
        for t in self.translation {
            writer.write_i32::<NativeEndian>(t)?;
        }
        writer.write_i32::<NativeEndian>(self.ofx)?;
        writer.write_i32::<NativeEndian>(self.ofy)?;
        writer.write_i16::<NativeEndian>(self.h)?;
        writer.write_i16::<NativeEndian>(self.dqa)?;
        writer.write_i16::<NativeEndian>(self.dqb)?;
        writer.write_i16::<NativeEndian>(self.zsf3)?;
        writer.write_i16::<NativeEndian>(self.zsf4)?;
        writer.write_u16::<NativeEndian>(self.clut)?;
        writer.write_u16::<NativeEndian>(self.tpage)?;
        writer.write_all(&self.u)?;
        writer.write_all(&self.v)?;
        writer.write_u16::<NativeEndian>(0)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut entry = Self {
            frame: reader.read_u32::<NativeEndian>()?,
            pc: reader.read_u32::<NativeEndian>()?,
            gp0_cmd: reader.read_u32::<NativeEndian>()?,
            primitive_type: reader.read_u16::<NativeEndian>()?,
            word_count: reader.read_u16::<NativeEndian>()?,
            ..Self::default()
        };
        reader.read_u32_into::<NativeEndian>(&mut entry.packet_words)?;
        reader.read_i16_into::<NativeEndian>(&mut entry.vx)?;
        reader.read_i16_into::<NativeEndian>(&mut entry.vy)?;
        reader.read_i16_into::<NativeEndian>(&mut entry.vz)?;
        reader.read_i16_into::<NativeEndian>(&mut entry.sx)?;
        reader.read_i16_into::<NativeEndian>(&mut entry.sy)?;
        for row in entry.rot.iter_mut() {
            reader.read_i16_into::<NativeEndian>(row)?;
        }
        let _padding = reader.read_u16::<NativeEndian>()?;
        reader.read_i32_into::<NativeEndian>(&mut entry.translation)?;
        entry.ofx = reader.read_i32::<NativeEndian>()?;
        entry.ofy = reader.read_i32::<NativeEndian>()?;
        entry.h = reader.read_i16::<NativeEndian>()?;
        entry.dqa = reader.read_i16::<NativeEndian>()?;
        entry.dqb = reader.read_i16::<NativeEndian>()?;
        entry.zsf3 = reader.read_i16::<NativeEndian>()?;
        entry.zsf4 = reader.read_i16::<NativeEndian>()?;
        entry.clut = reader.read_u16::<NativeEndian>()?;
        entry.tpage = reader.read_u16::<NativeEndian>()?;
        reader.read_exact(&mut entry.u)?;
        reader.read_exact(&mut entry.v)?;
        let _padding = reader.read_u16::<NativeEndian>()?;
        Ok(entry)
    }
}

/// The trailer at the end of a binary frame log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLogMetadata {
    pub metadata_size: u64,
    pub log_entry_size: u64,
    pub entry_count: u64,
    pub metadata_version: u64,
}

impl FrameLogMetadata {
    pub const ENCODED_SIZE: usize = 8 * 4;

    pub fn for_entries(entry_count: u64) -> Self {
        Self {
            metadata_size: Self::ENCODED_SIZE as u64,
            log_entry_size: LogEntry::ENCODED_SIZE as u64,
            entry_count,
            metadata_version: METADATA_VERSION,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u64::<NativeEndian>(self.metadata_size)?;
        writer.write_u64::<NativeEndian>(self.log_entry_size)?;
        writer.write_u64::<NativeEndian>(self.entry_count)?;
        writer.write_u64::<NativeEndian>(self.metadata_version)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            metadata_size: reader.read_u64::<NativeEndian>()?,
            log_entry_size: reader.read_u64::<NativeEndian>()?,
            entry_count: reader.read_u64::<NativeEndian>()?,
            metadata_version: reader.read_u64::<NativeEndian>()?,
        })
    }

    fn write_text<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "GPU frame log metadata")?;
        writeln!(writer, "Entry count: {}", self.entry_count)?;
        writeln!(writer, "LogEntry size (bytes): {}", self.log_entry_size)?;
        writeln!(writer, "Metadata block size (bytes): {}", self.metadata_size)?;
        writeln!(writer, "Metadata version: {}", self.metadata_version)?;
        write!(
            writer,
            "Notes: Raw structures are written with the host ABI, including any implicit \
             padding; consumers should validate sizes before interpreting fields."
        )
    }
}

/// The text file written next to a binary frame log at `path`.
///
/// The extension is replaced by `txt`, unless that would give `path` back, then `.txt`
/// is appended instead.
fn companion_text_path(path: &Path) -> PathBuf {
    let is_text = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("txt"));
    if is_text {
        let mut name = path.as_os_str().to_os_string();
        name.push(".txt");
        PathBuf::from(name)
    } else {
        path.with_extension("txt")
    }
}

/// Write the logged frame as [`LogEntry`] records followed by a [`FrameLogMetadata`]
/// trailer, and a text description of the trailer next to it, with a `.txt` extension.
pub fn save_frame_log<P: AsRef<Path>>(logger: &GpuLogger, path: P) -> Result<(), ExportError> {
    let path = path.as_ref();

    let mut output = BufWriter::new(File::create(path)?);
    let mut entry_count = 0;
    for logged in logger.iter() {
        LogEntry::from_logged(logged).write_to(&mut output)?;
        entry_count += 1;
    }
    let metadata = FrameLogMetadata::for_entries(entry_count);
    metadata.write_to(&mut output)?;
    output.flush()?;

    let mut text = BufWriter::new(File::create(companion_text_path(path))?);
    metadata.write_text(&mut text)?;
    text.flush()?;

    log::info!(
        "saved {} entries of frame {} to {}",
        entry_count,
        logger.frame(),
        path.display()
    );
    Ok(())
}

/// Reads the records of a binary frame log, after validating its trailer.
pub struct FrameLogReader<R> {
    reader: R,
    metadata: FrameLogMetadata,
    remaining: u64,
}

impl<R: Read + Seek> FrameLogReader<R> {
    pub fn new(mut reader: R) -> Result<Self, ExportError> {
        let len = reader.seek(SeekFrom::End(0))?;
        if len < FrameLogMetadata::ENCODED_SIZE as u64 {
            return Err(ExportError::TooSmall { len });
        }

        reader.seek(SeekFrom::End(-(FrameLogMetadata::ENCODED_SIZE as i64)))?;
        let metadata = FrameLogMetadata::read_from(&mut reader)?;

        if metadata.metadata_size != FrameLogMetadata::ENCODED_SIZE as u64
            || metadata.log_entry_size != LogEntry::ENCODED_SIZE as u64
        {
            return Err(ExportError::BadMetadata {
                metadata_size: metadata.metadata_size,
                log_entry_size: metadata.log_entry_size,
            });
        }
        if metadata.metadata_version != METADATA_VERSION {
            return Err(ExportError::UnsupportedVersion(metadata.metadata_version));
        }

        let expected = metadata
            .entry_count
            .checked_mul(metadata.log_entry_size)
            .and_then(|size| size.checked_add(metadata.metadata_size));
        if expected != Some(len) {
            return Err(ExportError::SizeMismatch {
                expected: expected.unwrap_or(u64::MAX),
                actual: len,
            });
        }

        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader,
            metadata,
            remaining: metadata.entry_count,
        })
    }

    pub fn metadata(&self) -> &FrameLogMetadata {
        &self.metadata
    }
}

impl<R: Read> Iterator for FrameLogReader<R> {
    type Item = Result<LogEntry, ExportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(LogEntry::read_from(&mut self.reader).map_err(ExportError::from))
    }
}

/// A binary frame log loaded in memory.
#[derive(Debug, Clone)]
pub struct FrameLog {
    pub metadata: FrameLogMetadata,
    pub entries: Vec<LogEntry>,
}

pub fn read_frame_log<P: AsRef<Path>>(path: P) -> Result<FrameLog, ExportError> {
    let reader = FrameLogReader::new(BufReader::new(File::open(path)?))?;
    let metadata = *reader.metadata();
    let entries = reader.collect::<Result<Vec<_>, _>>()?;

    Ok(FrameLog { metadata, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entry() -> LogEntry {
        LogEntry {
            frame: 3,
            pc: 0x8001_2340,
            gp0_cmd: 0x0211_2233,
            primitive_type: 0x02,
            word_count: 3,
            packet_words: [0x0211_2233, 0x0014_000A, 0x0005_0005, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            vx: [1, -2, 3, 0],
            rot: [[4096, 0, 0], [0, 4096, 0], [0, 0, 4096]],
            translation: [-1, 2, 1000],
            ofx: 160 << 16,
            ofy: 120 << 16,
            h: 300,
            dqb: -5,
            ..LogEntry::default()
        }
    }

    #[test]
    fn entry_encoding_size() {
        let mut buf = Vec::new();
        sample_entry().write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), LogEntry::ENCODED_SIZE);

        // translation starts after the padding following `rot`
        assert_eq!(
            i32::from_ne_bytes(buf[124..128].try_into().unwrap()),
            -1
        );
        assert_eq!(&buf[122..124], &[0, 0]);
    }

    #[test]
    fn entry_read_back() {
        let mut buf = Vec::new();
        sample_entry().write_to(&mut buf).unwrap();
        let entry = LogEntry::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(entry, sample_entry());
    }

    #[test]
    fn reader_validates_trailer() {
        let mut buf = Vec::new();
        sample_entry().write_to(&mut buf).unwrap();
        FrameLogMetadata::for_entries(1).write_to(&mut buf).unwrap();

        let reader = FrameLogReader::new(Cursor::new(buf.clone())).unwrap();
        assert_eq!(reader.metadata().entry_count, 1);
        assert_eq!(reader.count(), 1);

        // one entry claimed but missing
        let mut short = Vec::new();
        FrameLogMetadata::for_entries(1).write_to(&mut short).unwrap();
        assert!(matches!(
            FrameLogReader::new(Cursor::new(short)),
            Err(ExportError::SizeMismatch {
                expected: 200,
                actual: 32
            })
        ));

        assert!(matches!(
            FrameLogReader::new(Cursor::new(vec![0u8; 10])),
            Err(ExportError::TooSmall { len: 10 })
        ));

        let mut bad_version = Vec::new();
        FrameLogMetadata {
            metadata_version: 2,
            ..FrameLogMetadata::for_entries(0)
        }
        .write_to(&mut bad_version)
        .unwrap();
        assert!(matches!(
            FrameLogReader::new(Cursor::new(bad_version)),
            Err(ExportError::UnsupportedVersion(2))
        ));

        let mut bad_size = Vec::new();
        FrameLogMetadata {
            log_entry_size: 160,
            ..FrameLogMetadata::for_entries(0)
        }
        .write_to(&mut bad_size)
        .unwrap();
        assert!(matches!(
            FrameLogReader::new(Cursor::new(bad_size)),
            Err(ExportError::BadMetadata {
                log_entry_size: 160,
                ..
            })
        ));
    }

    #[test]
    fn metadata_text() {
        let mut text = Vec::new();
        FrameLogMetadata::for_entries(7)
            .write_text(&mut text)
            .unwrap();
        let text = String::from_utf8(text).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "GPU frame log metadata");
        assert_eq!(lines[1], "Entry count: 7");
        assert_eq!(lines[2], "LogEntry size (bytes): 168");
        assert_eq!(lines[3], "Metadata block size (bytes): 32");
        assert_eq!(lines[4], "Metadata version: 1");
        assert!(lines[5].starts_with("Notes: "));
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn companion_path_never_overwrites_log() {
        assert_eq!(
            companion_text_path(Path::new("logs/frame.bin")),
            PathBuf::from("logs/frame.txt")
        );
        assert_eq!(
            companion_text_path(Path::new("frame")),
            PathBuf::from("frame.txt")
        );
        assert_eq!(
            companion_text_path(Path::new("logs/frame.txt")),
            PathBuf::from("logs/frame.txt.txt")
        );
        assert_eq!(
            companion_text_path(Path::new("frame.TXT")),
            PathBuf::from("frame.TXT.txt")
        );
    }
}
