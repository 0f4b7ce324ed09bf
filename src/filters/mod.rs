//! Built-in filters.
//!
//! | Filter    | Role                                   | Needs                     |
//! |-----------|----------------------------------------|---------------------------|
//! | `fin`     | declares a local file                  | -                         |
//! | `inspect` | sink recording per-pid statistics      | -                         |
//! | `m2psdmx` | MPEG program stream demuxer            | [`m2psdmx::ProgramStreamLibrary`] |
//! | `ffenc`   | raw audio/video encoder                | [`ffenc::CodecLibrary`]   |

pub mod ffenc;
pub mod fin;
pub mod inspect;
pub mod m2psdmx;
