/*! BOB configuration.

A [`Config`](struct.Config.html) carries the two tunables of a new BOB file.
Start from `Config::new`, adjust, and finally call `create`; this follows
the builder approach of `std::fs::OpenOptions`.
*/

use std::path::Path;

use crate::fs::Bob;
use crate::io::Result;

/// Tunables for newly created BOB files.
///
/// Both sizes default to zero, meaning "pick automatically". The values are
/// resolved when the file is created and are immutable afterwards; opening
/// an existing file takes its geometry from the file header instead.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Config {
    pub(crate) blocksize: usize,
    pub(crate) cuesize: usize,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the assumed block size of the underlying filesystem.
    ///
    /// Values outside [512, 4 MiB] (including the zero default) are
    /// replaced at create time by the size the filesystem reports, or by
    /// 32768 if that is out of range too. A wrong block size may cause
    /// [`set`](../fs/struct.Bob.html#method.set) to fail if the filesystem
    /// refuses misaligned space reservations.
    pub fn blocksize(&mut self, size: usize) -> &mut Self {
        self.blocksize = size;
        self
    }

    /// Sets the cue size: the number of bytes after which the blob is
    /// written out afresh in a new self-describing cue block.
    ///
    /// Values below the effective block size (including the zero default)
    /// become 32 times the block size; anything else is clamped to 1 GiB
    /// and rounded down to a multiple of the block size.
    pub fn cuesize(&mut self, size: usize) -> &mut Self {
        self.cuesize = size;
        self
    }

    /// Returns the configured block size; zero means automatic.
    pub fn get_blocksize(&self) -> usize {
        self.blocksize
    }

    /// Returns the configured cue size; zero means automatic.
    pub fn get_cuesize(&self) -> usize {
        self.cuesize
    }

    /// Creates a new BOB at `path` with this configuration.
    ///
    /// ```no_run
    /// use bob::config::Config;
    ///
    /// let blob = Config::new().blocksize(4096).cuesize(1 << 20).create("tuned.bob")?;
    /// # drop(blob);
    /// # Ok::<(), bob::io::Error>(())
    /// ```
    pub fn create(&self, path: impl AsRef<Path>) -> Result<Bob> {
        Bob::create_with(path, self)
    }
}
