use byteorder::{LittleEndian, ReadBytesExt};
use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use crate::error::{Error, Result, eof_as};

/// Name prefixes Doom-engine games use for music lumps.
pub const MUSIC_PREFIXES: &[&str] = &["D_", "MUS_"];

/// WAD directory entry
#[derive(Debug, Clone)]
pub struct Lump {
    pub name: String, // upper ASCII without trailing NULs
    pub filepos: u32,
    pub size: u32,
}

/// An open IWAD or PWAD. Lump names are matched case-insensitively.
#[derive(Debug)]
pub struct Wad<R = BufReader<File>> {
    reader: R,
    lumps: Vec<Lump>,
}

impl Wad {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::InputOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> Wad<R> {
    /// Parse the header and directory.
    pub fn from_reader(mut reader: R) -> Result<Self> {
        // ident[4], numlumps[4], infotableofs[4]
        let mut ident = [0u8; 4];
        reader.read_exact(&mut ident).map_err(eof_as("WAD header"))?;
        if &ident != b"IWAD" && &ident != b"PWAD" {
            return Err(Error::NotAWad);
        }
        let numlumps = reader.read_u32::<LittleEndian>().map_err(eof_as("WAD header"))?;
        let infoofs = reader.read_u32::<LittleEndian>().map_err(eof_as("WAD header"))?;

        // numlumps entries of { filepos[4], size[4], name[8] }
        reader.seek(SeekFrom::Start(infoofs as u64))?;
        let mut lumps = Vec::with_capacity(numlumps.min(4096) as usize);
        for _ in 0..numlumps {
            let filepos = reader.read_u32::<LittleEndian>().map_err(eof_as("WAD directory"))?;
            let size = reader.read_u32::<LittleEndian>().map_err(eof_as("WAD directory"))?;
            let mut name = [0u8; 8];
            reader.read_exact(&mut name).map_err(eof_as("WAD directory"))?;
            lumps.push(Lump { name: lump_name(&name), filepos, size });
        }

        Ok(Self { reader, lumps })
    }

    pub fn lumps(&self) -> &[Lump] {
        &self.lumps
    }

    /// Lumps whose names carry a music prefix, in file order.
    pub fn music_lumps(&self) -> impl Iterator<Item = &Lump> {
        self.lumps
            .iter()
            .filter(|l| MUSIC_PREFIXES.iter().any(|p| l.name.starts_with(p)))
    }

    /// First lump with exactly this name.
    pub fn get(&self, name: &str) -> Option<&Lump> {
        let name = name.to_ascii_uppercase();
        self.lumps.iter().find(|l| l.name == name)
    }

    /// Resolve a song name: `RUNNIN`, `D_RUNNIN` and `e1m1` all work.
    pub fn find_music(&self, query: &str) -> Option<&Lump> {
        let q = query.trim().to_ascii_uppercase();
        if q.is_empty() {
            return None;
        }
        self.get(&q).or_else(|| {
            MUSIC_PREFIXES
                .iter()
                .find_map(|p| self.get(&format!("{p}{q}")))
        })
    }

    /// Read the bytes of the first lump with this name.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let lump = self
            .get(name)
            .cloned()
            .ok_or_else(|| Error::LumpNotFound(name.to_string()))?;

        self.reader.seek(SeekFrom::Start(lump.filepos as u64))?;
        let mut buf = vec![0u8; lump.size as usize];
        self.reader.read_exact(&mut buf).map_err(eof_as("WAD lump"))?;
        Ok(buf)
    }
}

/// 8-byte NUL-padded name to upper ASCII.
fn lump_name(b: &[u8; 8]) -> String {
    let s = b.split(|&c| c == 0).next().unwrap_or(b);
    String::from_utf8_lossy(s).to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    // Tiny WAD with two lumps: HELLO and D_TEST
    fn fake_wad() -> Vec<u8> {
        let hello = b"hello";
        let song = b"MUS\x1A";
        let hello_ofs = 12u32;
        let song_ofs = hello_ofs + hello.len() as u32;
        let dir_ofs = song_ofs + song.len() as u32;

        let mut w = b"IWAD".to_vec();
        w.extend_from_slice(&2u32.to_le_bytes());
        w.extend_from_slice(&dir_ofs.to_le_bytes());
        w.extend_from_slice(hello);
        w.extend_from_slice(song);
        for (ofs, len, name) in [
            (hello_ofs, hello.len(), &b"hello"[..]),
            (song_ofs, song.len(), &b"D_TEST"[..]),
        ] {
            w.extend_from_slice(&ofs.to_le_bytes());
            w.extend_from_slice(&(len as u32).to_le_bytes());
            let mut n = [0u8; 8];
            n[..name.len()].copy_from_slice(name);
            w.extend_from_slice(&n);
        }
        w
    }

    #[test]
    fn opens_and_lists() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&fake_wad()).unwrap();
        f.flush().unwrap();

        let wad = Wad::open(f.path()).unwrap();
        let names: Vec<_> = wad.lumps().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["HELLO", "D_TEST"]);
        let music: Vec<_> = wad.music_lumps().map(|l| l.name.as_str()).collect();
        assert_eq!(music, ["D_TEST"]);
    }

    #[test]
    fn finds_music_with_or_without_prefix() {
        let mut wad = Wad::from_reader(Cursor::new(fake_wad())).unwrap();
        assert_eq!(wad.find_music("test").unwrap().name, "D_TEST");
        assert_eq!(wad.find_music("d_test").unwrap().name, "D_TEST");
        assert!(wad.find_music("e1m1").is_none());
        assert!(wad.find_music("  ").is_none());

        assert_eq!(wad.read("hello").unwrap(), b"hello");
        assert!(wad.read("D_TEST").unwrap().starts_with(b"MUS"));
    }

    #[test]
    fn bad_header_is_rejected() {
        let err = Wad::from_reader(Cursor::new(b"XXXX\0\0\0\0\0\0\0\0".to_vec())).unwrap_err();
        assert!(format!("{err}").contains("not a WAD file"));
    }

    #[test]
    fn missing_lump_is_reported() {
        let mut wad = Wad::from_reader(Cursor::new(fake_wad())).unwrap();
        let err = wad.read("D_NOPE").unwrap_err();
        assert!(matches!(err, Error::LumpNotFound(n) if n == "D_NOPE"));
    }
}
