use failure::Fail;
use std::io;

/// Everything that can go wrong on the public surface.  There are only
/// two failure modes: the caller's progress callback asked us to stop,
/// or the operating system refused to give us worker threads.
#[derive(Debug, Fail)]
pub enum CarveError {
    #[fail(display = "resize cancelled by the progress callback")]
    Cancelled,
    #[fail(display = "could not start worker threads: {}", _0)]
    Startup(#[fail(cause)] io::Error),
}
