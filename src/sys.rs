//! Thin syscall wrappers which retry on interruption, so callers only ever
//! see real errors.

use std::os::unix::io::{BorrowedFd, RawFd};
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{self, FallocateFlags, OFlag};
use nix::sys::stat::Mode;
use nix::sys::statvfs::{self, Statvfs};
use nix::unistd::{self, Whence};

pub(crate) fn open(path: &Path, flags: OFlag, mode: Mode) -> nix::Result<RawFd> {
    loop {
        match fcntl::open(path, flags, mode) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub(crate) fn close(fd: RawFd) -> nix::Result<()> {
    loop {
        match unistd::close(fd) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub(crate) fn read(fd: RawFd, buf: &mut [u8]) -> nix::Result<usize> {
    loop {
        match unistd::read(fd, buf) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

/// Writes all of `buf`, looping over partial writes.
pub(crate) fn write_all(fd: RawFd, mut buf: &[u8]) -> nix::Result<()> {
    while !buf.is_empty() {
        match unistd::write(fd, buf) {
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
            Ok(written) => buf = &buf[written..],
        }
    }
    Ok(())
}

pub(crate) fn lseek(fd: RawFd, offset: libc::off_t, whence: Whence) -> nix::Result<libc::off_t> {
    loop {
        match unistd::lseek(fd, offset, whence) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub(crate) fn fsync(fd: RawFd) -> nix::Result<()> {
    loop {
        match unistd::fsync(fd) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub(crate) fn unlink(path: &Path) -> nix::Result<()> {
    loop {
        match unistd::unlink(path) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub(crate) fn fstatvfs(fd: RawFd) -> nix::Result<Statvfs> {
    loop {
        match statvfs::fstatvfs(&unsafe { BorrowedFd::borrow_raw(fd) }) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub(crate) fn fallocate(
    fd: RawFd,
    mode: FallocateFlags,
    offset: libc::off_t,
    len: libc::off_t,
) -> nix::Result<()> {
    loop {
        match fcntl::fallocate(fd, mode, offset, len) {
            Err(Errno::EINTR) => continue,
            result => return result.map(drop),
        }
    }
}

/// Reserves `len` bytes of backing store starting at the current file
/// offset, without extending the logical file length.
pub(crate) fn allocate_from_current(fd: RawFd, len: libc::off_t) -> nix::Result<()> {
    let current = lseek(fd, 0, Whence::SeekCur)?;
    fallocate(fd, FallocateFlags::FALLOC_FL_KEEP_SIZE, current, len)
}

/// Turns `[offset, offset + len)` into a sparse hole, keeping the logical
/// file length unchanged.
pub(crate) fn punch_hole(fd: RawFd, offset: libc::off_t, len: libc::off_t) -> nix::Result<()> {
    fallocate(
        fd,
        FallocateFlags::FALLOC_FL_PUNCH_HOLE | FallocateFlags::FALLOC_FL_KEEP_SIZE,
        offset,
        len,
    )
}
