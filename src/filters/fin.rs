//! File source filter.
//!
//! Declares one pid describing a local file (path, extension, MIME type)
//! and sends a single reference packet followed by end of stream. Parsers
//! downstream open the file themselves through their own library.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::filter::{ArgDescriptor, Filter, FilterArgs, FilterContext, FilterRegister, ProcessStatus};
use crate::format::StreamType;
use crate::packet::Packet;
use crate::pid::Pid;
use crate::property::PropertyKey;

/// Registered name.
pub const NAME: &str = "fin";

/// Guess a MIME type from a lowercase file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "mpg" | "mpeg" | "vob" | "m2p" => Some("video/mpeg"),
        "mp2" | "mp3" | "mpa" => Some("audio/mpeg"),
        _ => None,
    }
}

/// File source.
#[derive(Debug)]
pub struct FileIn {
    path: PathBuf,
    output: Option<Pid>,
    done: bool,
}

impl FileIn {
    /// Create a source for `path`. The file is not touched.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            output: None,
            done: false,
        }
    }

    fn from_args(args: &FilterArgs) -> Result<Self> {
        match args.get_str("src") {
            Some(src) if !src.is_empty() => Ok(Self::new(src)),
            _ => Err(Error::BadParam("fin requires a src argument".into())),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Filter for FileIn {
    fn initialize(&mut self, ctx: &mut FilterContext<'_>) -> Result<()> {
        let pid = ctx.new_pid();
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        pid.set_name(self.path.display().to_string());
        pid.set_property(PropertyKey::StreamType, StreamType::File);
        pid.set_property(PropertyKey::FilePath, self.path.display().to_string());
        if let Some(ext) = ext {
            if let Some(mime) = mime_for_extension(&ext) {
                pid.set_property(PropertyKey::Mime, mime);
            }
            pid.set_property(PropertyKey::FileExt, ext);
        }
        self.output = Some(pid);
        Ok(())
    }

    fn configure_pid(&mut self, _: &mut FilterContext<'_>, _: &Pid, _: bool) -> Result<()> {
        Err(Error::NotSupported("fin has no input".into()))
    }

    fn process(&mut self, _ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
        let Some(output) = &self.output else {
            return Ok(ProcessStatus::Eos);
        };
        if self.done {
            return Ok(ProcessStatus::Eos);
        }
        if output.would_block() {
            return Ok(ProcessStatus::Continue);
        }
        output.send(Packet::new(Vec::new()).with_framing(true, true))?;
        output.set_eos();
        self.done = true;
        tracing::debug!(path = %self.path.display(), "file reference sent");
        Ok(ProcessStatus::Eos)
    }
}

/// Register of the file source.
pub fn register() -> FilterRegister {
    FilterRegister::new(NAME, |args| {
        Ok(Box::new(FileIn::from_args(args)?) as Box<dyn Filter>)
    })
    .with_description("Local file source")
    .with_arg(ArgDescriptor::string("src", None, "path of the file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TestHarness;

    #[test]
    fn test_declares_file_pid() {
        let mut harness = TestHarness::new(NAME);
        let mut fin = FileIn::new("/media/Movie.MPG");
        harness.run(|ctx| fin.initialize(ctx)).expect("init");

        let props = harness.outputs[0].properties();
        assert_eq!(props.stream_type(), Some(StreamType::File));
        assert_eq!(props.str(PropertyKey::FileExt), Some("mpg"));
        assert_eq!(props.str(PropertyKey::Mime), Some("video/mpeg"));
        assert_eq!(props.str(PropertyKey::FilePath), Some("/media/Movie.MPG"));
    }

    #[test]
    fn test_single_reference_packet() {
        let mut harness = TestHarness::new(NAME);
        let mut fin = FileIn::new("clip.vob");
        harness.run(|ctx| fin.initialize(ctx)).expect("init");

        let status = harness.run(|ctx| fin.process(ctx)).expect("process");
        assert_eq!(status, ProcessStatus::Eos);
        let pid = harness.outputs[0].clone();
        let pck = pid.get_packet().expect("packet");
        assert!(pck.framing_start() && pck.framing_end());
        assert!(pid.eos_signaled());

        assert_eq!(harness.run(|ctx| fin.process(ctx)).expect("again"), ProcessStatus::Eos);
        assert_eq!(pid.queued_packets(), 1);
    }

    #[test]
    fn test_src_is_required() {
        assert!(register().instantiate(&FilterArgs::new()).is_err());
        assert!(register()
            .instantiate(&FilterArgs::new().with("src", "a.mpg"))
            .is_ok());
    }

    #[test]
    fn test_mime_guess() {
        assert_eq!(mime_for_extension("mp2"), Some("audio/mpeg"));
        assert_eq!(mime_for_extension("mkv"), None);
    }
}
