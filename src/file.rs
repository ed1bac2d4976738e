//! The file engine behind [`Bob`](crate::fs::Bob): header I/O, buffered
//! block-aligned writes, parse-on-open, cue management and hole-punch
//! reclaim.

use std::convert::TryFrom;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;

use log::{debug, trace};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::Whence;

use crate::config::Config;
use crate::consts::{
    CUE_SIZE_MULTIPLIER, DEFAULT_BLOCK_SIZE, MAGIC, MAX_BLOCK_SIZE, MAX_CUE_SIZE, MIN_BLOCK_SIZE,
    RECORD_REWRITE, TAG_BLOCK_SIZE, TAG_CUE_SIZE, TAG_END,
};
use crate::io::{Error, Result};
use crate::sys;
use crate::varint;

/// Picks the block size for a new file: the configured value if in range,
/// else what the filesystem reports, else the default.
fn real_blocksize(fd: RawFd, configured: usize) -> usize {
    if (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&configured) {
        return configured;
    }
    let reported = match sys::fstatvfs(fd) {
        Ok(vfs) => vfs.block_size() as usize,
        Err(_) => return DEFAULT_BLOCK_SIZE,
    };
    if (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&reported) {
        reported
    } else {
        DEFAULT_BLOCK_SIZE
    }
}

/// Picks the cue size for a new file: a bounded multiple of the block size.
fn real_cuesize(blocksize: usize, configured: usize) -> usize {
    if configured < blocksize {
        return blocksize * CUE_SIZE_MULTIPLIER;
    }
    let clamped = configured.min(MAX_CUE_SIZE);
    clamped - clamped % blocksize
}

/// Engine state for one open BOB file.
///
/// `buf` is a single block-sized buffer. While the file is being parsed it
/// buffers reads: `[pos..written)` is unread data and `[written..]` unread
/// capacity. Once parsing is over it buffers writes: `[written..pos)` is
/// dirty. The descriptor offset always marks where `buf[written]` lands in
/// the file.
#[derive(Debug)]
pub(crate) struct BobFile {
    fd: OwnedFd,
    blocksize: usize,
    cuesize: usize,
    buf: Vec<u8>,
    pos: usize,
    written: usize,
}

impl BobFile {
    /// Creates a new BOB file at `path`, resolving geometry from `config`
    /// and buffering the first header.
    pub(crate) fn create(config: &Config, path: &Path) -> Result<BobFile> {
        let fd = sys::open(
            path,
            OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
            Mode::from_bits_truncate(0o666),
        )?;
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        let blocksize = real_blocksize(fd.as_raw_fd(), config.blocksize);
        let cuesize = real_cuesize(blocksize, config.cuesize);
        debug!(
            "creating {}: blocksize {}, cuesize {}",
            path.display(),
            blocksize,
            cuesize
        );
        let mut file = BobFile {
            fd,
            blocksize,
            cuesize,
            buf: Vec::new(),
            pos: 0,
            written: 0,
        };
        match file.init_buf().and_then(|()| file.write_header()) {
            Ok(()) => Ok(file),
            Err(err) => {
                // Leave no half-written file behind; the descriptor closes
                // when `file` drops.
                let _ = sys::unlink(path);
                Err(err)
            }
        }
    }

    /// Opens an existing BOB file and adopts the geometry of its header.
    ///
    /// Must be followed by [`parse`](BobFile::parse); writing to a freshly
    /// opened file would clobber the live cue.
    pub(crate) fn open(path: &Path) -> Result<BobFile> {
        let fd = sys::open(path, OFlag::O_RDWR, Mode::empty())?;
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        // The real block size is unknown until the header has been read.
        let mut buf = Vec::new();
        buf.try_reserve_exact(DEFAULT_BLOCK_SIZE)?;
        buf.resize(DEFAULT_BLOCK_SIZE, 0);
        let mut file = BobFile {
            fd,
            blocksize: DEFAULT_BLOCK_SIZE,
            cuesize: 0,
            buf,
            pos: 0,
            written: 0,
        };
        // Earlier cues may have been reclaimed as holes; the live cue is
        // the first data extent.
        let data_start = match sys::lseek(file.fd.as_raw_fd(), 0, Whence::SeekData) {
            Ok(offset) => offset,
            Err(Errno::ENXIO) => return Err(Error::Corrupt),
            Err(err) => return Err(err.into()),
        };
        file.read_header()?;
        if data_start % (file.cuesize as libc::off_t) != 0 {
            return Err(Error::Corrupt);
        }
        trace!("opened {}: live cue at {}", path.display(), data_start);
        Ok(file)
    }

    pub(crate) fn blocksize(&self) -> usize {
        self.blocksize
    }

    pub(crate) fn cuesize(&self) -> usize {
        self.cuesize
    }

    /// Reserves the first block and sets up the block-sized buffer.
    fn init_buf(&mut self) -> Result<()> {
        sys::allocate_from_current(self.fd.as_raw_fd(), self.blocksize as libc::off_t)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(self.blocksize)?;
        buf.resize(self.blocksize, 0);
        self.buf = buf;
        self.pos = 0;
        self.written = 0;
        Ok(())
    }

    /// Writes `data` through the block-sized buffer.
    ///
    /// Data that still fits in the buffer is only copied. Anything more
    /// reserves backing store up to the next block boundary, flushes the
    /// dirty prefix, and writes whole blocks straight from `data`; the tail
    /// remainder stays buffered.
    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.pos + data.len() <= self.blocksize {
            self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
            return Ok(());
        }
        let mut allocate = self.pos + data.len();
        if allocate % self.blocksize != 0 {
            allocate += self.blocksize - allocate % self.blocksize;
        }
        sys::allocate_from_current(self.fd.as_raw_fd(), (allocate - self.pos) as libc::off_t)?;
        if self.written != self.pos {
            sys::write_all(self.fd.as_raw_fd(), &self.buf[self.written..self.pos])?;
        }
        let surplus = self.blocksize - self.pos;
        let numblocks = (data.len() - surplus) / self.blocksize;
        let towrite = surplus + numblocks * self.blocksize;
        sys::write_all(self.fd.as_raw_fd(), &data[..towrite])?;
        self.written = 0;
        self.buf[..data.len() - towrite].copy_from_slice(&data[towrite..]);
        self.pos = data.len() - towrite;
        Ok(())
    }

    /// Flushes the dirty prefix of the buffer to the descriptor.
    pub(crate) fn commit(&mut self) -> Result<()> {
        if self.written == self.pos {
            return Ok(());
        }
        sys::write_all(self.fd.as_raw_fd(), &self.buf[self.written..self.pos])?;
        self.written = self.pos;
        Ok(())
    }

    /// Emits the magic and the tag/value geometry pairs into the buffer.
    fn write_header(&mut self) -> Result<()> {
        self.write(&MAGIC)?;
        let fields = [
            TAG_BLOCK_SIZE,
            self.blocksize as u64,
            TAG_CUE_SIZE,
            self.cuesize as u64,
            TAG_END,
        ];
        let mut vbuf = [0u8; varint::MAX_LEN];
        for &n in &fields {
            let len = varint::encode(&mut vbuf, n);
            self.write(&vbuf[..len])?;
        }
        Ok(())
    }

    /// Checks for end of file, refilling the read buffer if it is drained.
    fn is_eof(&mut self) -> Result<bool> {
        if self.pos != self.written {
            return Ok(false);
        }
        if self.written == self.blocksize {
            self.pos = 0;
            self.written = 0;
        }
        let rd = sys::read(self.fd.as_raw_fd(), &mut self.buf[self.written..])?;
        if rd == 0 {
            return Ok(true);
        }
        self.written += rd;
        Ok(false)
    }

    /// Reads exactly `out.len()` bytes through the buffer.
    ///
    /// Hitting end of file short of `out` is corruption: headers and record
    /// bodies never end early.
    fn read(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        loop {
            let avail = self.written - self.pos;
            let need = out.len() - filled;
            if need <= avail {
                out[filled..].copy_from_slice(&self.buf[self.pos..self.pos + need]);
                self.pos += need;
                return Ok(());
            }
            out[filled..filled + avail].copy_from_slice(&self.buf[self.pos..self.written]);
            filled += avail;
            self.pos = self.written;
            if self.written == self.blocksize {
                self.pos = 0;
                self.written = 0;
            }
            let rd = sys::read(self.fd.as_raw_fd(), &mut self.buf[self.written..])?;
            if rd == 0 {
                return Err(Error::Corrupt);
            }
            self.written += rd;
        }
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut n = 0;
        let mut count = 0;
        loop {
            let mut byte = [0u8; 1];
            self.read(&mut byte)?;
            count = varint::decode(&mut n, byte[0], count).ok_or(Error::Corrupt)?;
            if count == 0 {
                return Ok(n);
            }
        }
    }

    /// Parses the header the descriptor is positioned at and adopts its
    /// geometry, reallocating the buffer to the discovered block size.
    fn read_header(&mut self) -> Result<()> {
        let mut magic = [0u8; 4];
        self.read(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::Corrupt);
        }
        let mut blocksize: u64 = 0;
        let mut cuesize: u64 = 0;
        loop {
            match self.read_varint()? {
                TAG_BLOCK_SIZE => blocksize = self.read_varint()?,
                TAG_CUE_SIZE => cuesize = self.read_varint()?,
                TAG_END => break,
                _ => return Err(Error::Corrupt),
            }
        }
        let blocksize = usize::try_from(blocksize).map_err(|_| Error::Corrupt)?;
        let cuesize = usize::try_from(cuesize).map_err(|_| Error::Corrupt)?;
        if blocksize < MIN_BLOCK_SIZE
            || blocksize > MAX_BLOCK_SIZE
            || cuesize < blocksize
            || cuesize > MAX_CUE_SIZE
            || cuesize % blocksize != 0
        {
            return Err(Error::Corrupt);
        }
        if self.written > blocksize {
            // The pre-read filled the buffer past the real block boundary;
            // rewind so the excess is re-read at the new block size.
            sys::lseek(
                self.fd.as_raw_fd(),
                blocksize as libc::off_t - self.written as libc::off_t,
                Whence::SeekCur,
            )?;
            self.written = blocksize;
        }
        if blocksize != self.blocksize {
            if blocksize > self.buf.len() {
                self.buf.try_reserve_exact(blocksize - self.buf.len())?;
            }
            self.buf.resize(blocksize, 0);
            self.blocksize = blocksize;
        }
        self.cuesize = cuesize;
        Ok(())
    }

    /// Replays the data records following the header and returns the last
    /// REWRITE record verbatim, along with the offset where its payload
    /// starts.
    ///
    /// At end of file the buffer flips to write mode, so the next write
    /// allocates fresh space instead of clobbering the live cue's tail.
    pub(crate) fn parse(&mut self) -> Result<(Vec<u8>, usize)> {
        let mut data = Vec::new();
        let mut offset = 0;
        loop {
            if self.is_eof()? {
                self.pos = self.blocksize;
                self.written = self.blocksize;
                return Ok((data, offset));
            }
            match self.read_varint()? {
                RECORD_REWRITE => {
                    let len = self.read_varint()?;
                    let len = usize::try_from(len).map_err(|_| Error::NoMemory)?;
                    let mut vbuf = [0u8; varint::MAX_LEN];
                    let vlen = varint::encode(&mut vbuf, len as u64);
                    let mut record = Vec::new();
                    record.try_reserve_exact(1 + vlen + len)?;
                    record.push(RECORD_REWRITE as u8);
                    record.extend_from_slice(&vbuf[..vlen]);
                    record.resize(1 + vlen + len, 0);
                    self.read(&mut record[1 + vlen..])?;
                    data = record;
                    offset = 1 + vlen;
                }
                _ => return Err(Error::Corrupt),
            }
        }
    }

    /// Bytes left until the end of the current cue block, measured from the
    /// committed descriptor offset. Zero on a cue boundary: the boundary
    /// belongs to the next cue's header.
    fn cue_remaining(&self) -> Result<libc::off_t> {
        let current = sys::lseek(self.fd.as_raw_fd(), 0, Whence::SeekCur)?;
        let rem = current % (self.cuesize as libc::off_t);
        if rem == 0 {
            return Ok(0);
        }
        Ok(self.cuesize as libc::off_t - rem)
    }

    /// Seeks forward to the next cue boundary (unless already on one),
    /// resets the buffer and writes a fresh header.
    ///
    /// Returns the byte offset of the new cue.
    fn new_cue(&mut self) -> Result<libc::off_t> {
        let mut current = sys::lseek(self.fd.as_raw_fd(), 0, Whence::SeekCur)?;
        let rem = current % (self.cuesize as libc::off_t);
        if rem != 0 {
            current += self.cuesize as libc::off_t - rem;
            sys::lseek(self.fd.as_raw_fd(), current, Whence::SeekSet)?;
        }
        self.pos = 0;
        self.written = 0;
        self.write_header()?;
        Ok(current)
    }

    /// Appends one encoded record, starting a new cue when the current one
    /// cannot hold it, and commits the buffered write.
    ///
    /// Returns the start offset of the freshly begun cue if the record
    /// rolled over to one and there is a region before it to reclaim; the
    /// caller passes that offset to [`zap`](BobFile::zap) once its own state
    /// is updated.
    pub(crate) fn append_record(&mut self, record: &[u8]) -> Result<Option<libc::off_t>> {
        let remaining = self.cue_remaining()?;
        let mut rolled = None;
        if remaining < record.len() as libc::off_t {
            let start = self.new_cue()?;
            debug!("cue rollover: new cue at {}", start);
            if start > 0 {
                rolled = Some(start);
            }
        }
        self.write(record)?;
        self.commit()?;
        Ok(rolled)
    }

    /// Punches out everything before `start_off`, leaving the logical file
    /// length unchanged.
    pub(crate) fn zap(&mut self, start_off: libc::off_t) -> Result<()> {
        trace!("zapping [0, {})", start_off);
        sys::punch_hole(self.fd.as_raw_fd(), 0, start_off)?;
        Ok(())
    }

    /// Commits the buffer and syncs the descriptor.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let committed = self.commit();
        let synced = sys::fsync(self.fd.as_raw_fd()).map_err(Error::from);
        committed.and(synced)
    }

    /// Closes the file, committing buffered data first.
    ///
    /// The descriptor and buffer are released even when committing or
    /// syncing fails; the first error is reported.
    pub(crate) fn close(mut self) -> Result<()> {
        let committed = self.commit();
        let synced = sys::fsync(self.fd.as_raw_fd()).map_err(Error::from);
        let closed = sys::close(self.fd.into_raw_fd()).map_err(Error::from);
        committed.and(synced).and(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        (dir, path)
    }

    #[test]
    fn blocksize_resolution_prefers_configured_value() {
        let file = tempfile::tempfile().unwrap();
        let fd = std::os::unix::io::AsRawFd::as_raw_fd(&file);
        assert_eq!(real_blocksize(fd, 4096), 4096);
        assert_eq!(real_blocksize(fd, MIN_BLOCK_SIZE), MIN_BLOCK_SIZE);
        assert_eq!(real_blocksize(fd, MAX_BLOCK_SIZE), MAX_BLOCK_SIZE);
        // out of range falls back to the filesystem or the default
        let resolved = real_blocksize(fd, 0);
        assert!((MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&resolved));
        let resolved = real_blocksize(fd, MAX_BLOCK_SIZE + 1);
        assert!((MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&resolved));
    }

    #[test]
    fn cuesize_resolution_bounds_and_aligns() {
        assert_eq!(real_cuesize(512, 0), 512 * CUE_SIZE_MULTIPLIER);
        assert_eq!(real_cuesize(4096, 100), 4096 * CUE_SIZE_MULTIPLIER);
        assert_eq!(real_cuesize(4096, 10_000), 8192);
        assert_eq!(real_cuesize(512, 2 * MAX_CUE_SIZE), MAX_CUE_SIZE);
        assert_eq!(real_cuesize(4096, 4096), 4096);
    }

    #[test]
    fn buffered_writes_spill_whole_blocks() {
        let (_dir, path) = scratch("spill.bob");
        let mut config = Config::new();
        config.blocksize(512);
        let mut file = BobFile::create(&config, &path).unwrap();
        let header_len = {
            use crate::varint::encoded_len;
            MAGIC.len()
                + encoded_len(TAG_BLOCK_SIZE)
                + encoded_len(512)
                + encoded_len(TAG_CUE_SIZE)
                + encoded_len(512 * CUE_SIZE_MULTIPLIER as u64)
                + encoded_len(TAG_END)
        };
        // five chunks crossing several block boundaries
        let mut expected = Vec::new();
        for round in 0u8..5 {
            let chunk = [round; 300];
            file.write(&chunk).unwrap();
            expected.extend_from_slice(&chunk);
        }
        file.commit().unwrap();
        file.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), header_len + expected.len());
        assert_eq!(&bytes[..MAGIC.len()], &MAGIC);
        assert_eq!(&bytes[header_len..], &expected[..]);
    }

    #[test]
    fn create_fails_cleanly_on_existing_path() {
        let (_dir, path) = scratch("exists.bob");
        let config = Config::new();
        BobFile::create(&config, &path).unwrap().close().unwrap();
        assert_eq!(
            BobFile::create(&config, &path).map(drop),
            Err(Error::EntryAlreadyExisted)
        );
        // the collision must not unlink the existing file
        assert!(path.exists());
    }
}
