/*!

BOBs — binary object files — are files which represent a single, contiguous
blob of bytes, replaced as a whole. The on-disk format is designed to be
gentle on storage media with a limited number of write/erase cycles (flash,
mainly) when the blob changes often: replacing the contents appends a fresh
record to the current *cue block*, and once a new cue block has been
committed, everything before it is reclaimed as a sparse hole. The file's
logical length only ever grows; its physical footprint stays bounded by the
cue size.

BOBs are a good fit for small to medium blobs (up to hundreds of kilobytes),
or larger blobs which change very little. For large data which changes a
lot you don't need BOBs; write the data out in full and let the device's
wear levelling do its job.

## Configuration

A BOB supports two tunables, both set through [`Config`](config/struct.Config.html)
when the file is created, both with a default of zero meaning "pick
automatically":

- *Block size*: the I/O alignment unit, ideally the block size of the
  underlying filesystem. If the configured value does not resolve into
  [512, 4 MiB], the size reported by the filesystem is used, and failing
  that, 32768, which is safe for most filesystems.
- *Cue size*: the granularity at which fresh self-describing cue blocks
  begin, and hence the granularity of physical reclaim. Must be a multiple
  of the block size and at most 1 GiB; the default is 32 times the block
  size.

Both sizes are immutable for the lifetime of a file; they are recorded in
the file header and rediscovered on open.

## Thread safety

Operations on distinct handles for distinct files may run concurrently
without coordination. A single handle is single-threaded; nothing here
spawns background work, and all I/O is synchronous on the calling thread.

## File safety

It is the caller's responsibility to ensure that a BOB file is opened only
once at any given time. The library does not lock files, nor does it use
any other means to ensure exclusive access; two concurrent openers of the
same path can corrupt the file.

## Usage

```no_run
use bob::fs::Bob;

let mut blob = Bob::create("counter.bob")?;
blob.set(b"current state of the world")?;
assert_eq!(blob.current(), b"current state of the world");
blob.close()?;

let blob = Bob::open("counter.bob")?;
assert_eq!(blob.current(), b"current state of the world");
blob.close()?;
# Ok::<(), bob::io::Error>(())
```

*/

pub mod config;

/// File-format constants.
pub mod consts;

mod file;

pub mod fs;

/// Error and result types for BOB operations.
pub mod io;

mod sys;

/// The varint codec used by the on-disk format.
pub mod varint;
