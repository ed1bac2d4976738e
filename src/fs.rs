/*! Binary object file handles.

Start with the documentation for [`Bob`](struct.Bob.html).
*/

use std::path::Path;

use log::trace;

use crate::config::Config;
use crate::consts::RECORD_REWRITE;
use crate::file::BobFile;
use crate::io::Result;
use crate::varint;

/** The main API entry point: a handle to one binary object file.

A `Bob` holds a single, contiguous blob of bytes, replaced as a whole with
[`set`](struct.Bob.html#method.set) and read back with
[`current`](struct.Bob.html#method.current). Obtain a handle with
[`Bob::create`](struct.Bob.html#method.create) (or
[`Config::create`](../config/struct.Config.html#method.create) for tuned
geometry) for a new file, or [`Bob::open`](struct.Bob.html#method.open) for
an existing one.

The handle keeps a copy of the latest contents in memory, so `current` never
touches the disk. `set` writes through to the underlying file before the
copy is swapped; call [`flush`](struct.Bob.html#method.flush) to force the
data down to the storage device, and finish with
[`close`](struct.Bob.html#method.close), which reports errors a plain drop
would have to swallow.
*/
#[derive(Debug)]
pub struct Bob {
    file: BobFile,
    /// The latest REWRITE record verbatim, including its kind byte and
    /// length varint.
    data: Vec<u8>,
    /// Offset into `data` where the user bytes start.
    offset: usize,
}

impl Bob {
    /// Creates a new, empty BOB at `path` with the default configuration.
    ///
    /// Fails with [`Error::EntryAlreadyExisted`](../io/enum.Error.html) if
    /// `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Bob> {
        Config::new().create(path)
    }

    pub(crate) fn create_with(path: impl AsRef<Path>, config: &Config) -> Result<Bob> {
        let file = BobFile::create(config, path.as_ref())?;
        Ok(Bob {
            file,
            data: Vec::new(),
            offset: 0,
        })
    }

    /// Opens an existing BOB file and reads its current contents.
    ///
    /// A file whose header, varints or records violate the format fails
    /// with [`Error::Corrupt`](../io/enum.Error.html) and is left untouched
    /// for inspection.
    pub fn open(path: impl AsRef<Path>) -> Result<Bob> {
        let mut file = BobFile::open(path.as_ref())?;
        let (data, offset) = file.parse()?;
        Ok(Bob { file, data, offset })
    }

    /// Replaces the blob contents.
    ///
    /// The new contents are appended to the live cue as a fresh record — or
    /// to a new cue when the live one cannot hold them, reclaiming the old
    /// region as a sparse hole — and committed to the file. The in-memory
    /// copy is swapped only after the commit succeeds: on error, `current`
    /// and the on-disk state still hold the previous contents.
    pub fn set(&mut self, contents: &[u8]) -> Result<()> {
        let mut vbuf = [0u8; varint::MAX_LEN];
        let vlen = varint::encode(&mut vbuf, contents.len() as u64);
        let mut record = Vec::new();
        record.try_reserve_exact(1 + vlen + contents.len())?;
        record.push(RECORD_REWRITE as u8);
        record.extend_from_slice(&vbuf[..vlen]);
        record.extend_from_slice(contents);
        let rolled = self.file.append_record(&record)?;
        self.offset = 1 + vlen;
        self.data = record;
        trace!("set {} bytes", contents.len());
        if let Some(start) = rolled {
            self.file.zap(start)?;
        }
        Ok(())
    }

    /// Returns the current blob contents.
    ///
    /// The slice borrows from the handle; the next
    /// [`set`](struct.Bob.html#method.set) supersedes it.
    pub fn current(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// Ensures the latest contents have reached the storage device.
    ///
    /// [`set`](struct.Bob.html#method.set) already writes the data to the
    /// underlying file; this merely forces cached file data to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }

    /// Closes the BOB, flushing buffered data to disk.
    ///
    /// Resources are released even on error; the first error encountered is
    /// reported.
    pub fn close(self) -> Result<()> {
        self.file.close()
    }

    /// The block size this file uses.
    pub fn blocksize(&self) -> usize {
        self.file.blocksize()
    }

    /// The cue size this file uses.
    pub fn cuesize(&self) -> usize {
        self.file.cuesize()
    }
}
