//! Integration tests for the program stream demuxer.
//!
//! These tests verify that:
//! - A file declared by `fin` plays to end of stream through `m2psdmx`
//! - Timestamps start at zero and never go backwards
//! - Repeated PLAY events do not seek again
//! - Property updates with the same locator keep the opened stream
//! - Missing and malformed files produce distinct setup failures
//! - Output queues respect the session water marks

mod common;

use common::{Container, MockCodecs, MockParser, SlowSink, TouchableFile, custom_upstream, registry};
use pidflow::filters::m2psdmx;
use pidflow::prelude::*;
use std::sync::atomic::Ordering;

const MOVIE: &str = "/media/movie.mpg";

fn session_for(parser: MockParser) -> (Session, inspect::SharedReport) {
    let (registry, report) = registry(parser, MockCodecs::default());
    let session = Session::new(Arc::new(registry), SessionConfig::default());
    (session, report)
}

#[test]
fn test_plays_to_end_of_stream() {
    let parser = MockParser::default().with_file(MOVIE, Container::simple(1, 1, 10, 45_000));
    let (mut session, report) = session_for(parser);

    session
        .load_filter("fin", FilterArgs::new().with("src", MOVIE))
        .unwrap();
    session.load_filter("m2psdmx", FilterArgs::new()).unwrap();
    session.load_filter("inspect", FilterArgs::new()).unwrap();

    let run = session.run().unwrap();
    assert!(run.is_complete(), "unfinished run: {run:?}");
    assert!(!run.stalled);

    let report = report.lock();
    let video = report.of_type(StreamType::Visual);
    let audio = report.of_type(StreamType::Audio);
    assert_eq!(video.len(), 1);
    assert_eq!(audio.len(), 1);

    let video = video[0];
    assert_eq!(video.codec_id, Some(CodecId::Mpeg2Video));
    assert_eq!(video.stream_id, Some(1));
    assert_eq!(video.packets, 10);
    assert_eq!(video.rap_packets, 4);
    assert!(video.eos);

    let audio = audio[0];
    assert_eq!(audio.codec_id, Some(CodecId::MpegAudio));
    assert_eq!(audio.stream_id, Some(100));
    assert_eq!(audio.packets, 10);
    assert_eq!(audio.rap_packets, 10);
    assert!(audio.eos);

    let notices = session.drain_notices();
    assert!(notices.iter().all(|n| !n.is_error()), "{notices:?}");
    assert!(notices.contains(&SessionNotice::FilterEos {
        filter: "m2psdmx".into()
    }));
}

#[test]
fn test_timestamps_are_normalized_and_monotonic() {
    let parser = MockParser::default().with_file(MOVIE, Container::simple(1, 1, 6, 900_000));
    let (mut session, report) = session_for(parser);

    session
        .load_filter("fin", FilterArgs::new().with("src", MOVIE))
        .unwrap();
    session.load_filter("m2psdmx", FilterArgs::new()).unwrap();
    session.load_filter("inspect", FilterArgs::new()).unwrap();
    session.run().unwrap();

    let report = report.lock();
    for pid in &report.pids {
        assert!(pid.cts_monotonic, "{pid:?}");
        assert_eq!(pid.first_cts, Some(0));
    }
    let video = report.of_type(StreamType::Visual)[0];
    assert_eq!(video.last_cts, Some(5 * 3600));
    let audio = report.of_type(StreamType::Audio)[0];
    assert_eq!(audio.last_cts, Some(5 * 2160));
}

#[test]
fn test_repeated_play_seeks_once() {
    let parser = MockParser::default().with_file(MOVIE, Container::simple(2, 1, 4, 0));
    let log = parser.log.clone();
    let (mut session, report) = session_for(parser);

    session
        .load_filter("fin", FilterArgs::new().with("src", MOVIE))
        .unwrap();
    session.load_filter("m2psdmx", FilterArgs::new()).unwrap();
    session.load_filter("inspect", FilterArgs::new()).unwrap();
    session.run().unwrap();

    // One PLAY per inspected pid, but only the first one moves the parser.
    assert_eq!(report.lock().pids.len(), 3);
    let seeks = log.seeks.lock().clone();
    assert_eq!(seeks.len(), 3);
    assert!(seeks.iter().all(|&(_, _, ms)| ms == 0));
    assert_eq!(seeks.iter().filter(|s| s.0).count(), 2);
}

#[test]
fn test_stop_then_play_from_position() {
    let parser = MockParser::default().with_file(MOVIE, Container::simple(1, 0, 40, 0));
    let log = parser.log.clone();
    let (registry, report) = registry(parser, MockCodecs::default());
    let config = SessionConfig::default().with_max_ticks(3);
    let mut session = Session::new(Arc::new(registry), config);

    session
        .load_filter("fin", FilterArgs::new().with("src", MOVIE))
        .unwrap();
    session.load_filter("m2psdmx", FilterArgs::new()).unwrap();
    session.load_filter("inspect", FilterArgs::new()).unwrap();
    session.run().unwrap();

    session.stop();
    let before = report.lock().total_packets();
    let stopped = session.run().unwrap();
    assert!(stopped.active.contains(&"m2psdmx".to_string()));
    assert_eq!(report.lock().total_packets(), before);

    session.play(1.5);
    session.run().unwrap();
    assert!(report.lock().total_packets() > before);
    assert_eq!(log.seeks.lock().last(), Some(&(true, 0, 1500)));
}

#[test]
fn test_same_locator_keeps_stream_open() {
    let parser = MockParser::default().with_file(MOVIE, Container::simple(1, 1, 30, 0));
    let log = parser.log.clone();
    let (mut session, report) = session_for(parser);

    session
        .add_filter("touchable", None, Box::new(TouchableFile::new(MOVIE)))
        .unwrap();
    let demux = session.load_filter("m2psdmx", FilterArgs::new()).unwrap();
    session.load_filter("inspect", FilterArgs::new()).unwrap();

    for _ in 0..3 {
        session.run_once();
    }
    assert_eq!(log.opens.load(Ordering::SeqCst), 1);

    // The file source rewrites a property of its pid, which makes the
    // demuxer reconfigure with an unchanged path.
    session.send_event(demux, custom_upstream("touch"));
    session.run().unwrap();

    assert_eq!(log.opens.load(Ordering::SeqCst), 1);
    let report = report.lock();
    assert_eq!(report.of_type(StreamType::Visual)[0].packets, 30);
    assert_eq!(report.of_type(StreamType::Audio)[0].packets, 30);
}

#[test]
fn test_missing_and_malformed_files() {
    let malformed = tempfile::Builder::new()
        .suffix(".mpg")
        .tempfile()
        .unwrap();
    let malformed_path = malformed.path().display().to_string();

    let cases = [
        ("/no/such/dir/movie.mpg".to_string(), "URL error"),
        (malformed_path, "non compliant bitstream"),
    ];
    for (path, expected) in cases {
        let (mut session, _report) = session_for(MockParser::default());
        session
            .load_filter("fin", FilterArgs::new().with("src", path.as_str()))
            .unwrap();
        session.load_filter("m2psdmx", FilterArgs::new()).unwrap();
        session.load_filter("inspect", FilterArgs::new()).unwrap();

        let run = session.run().unwrap();
        assert_eq!(run.failed, vec!["m2psdmx".to_string()]);

        let failure = session
            .drain_notices()
            .into_iter()
            .find_map(|n| match n {
                SessionNotice::SetupFailure { filter, error } => Some((filter, error)),
                _ => None,
            })
            .expect("setup failure notice");
        assert_eq!(failure.0, "m2psdmx");
        assert!(failure.1.starts_with(expected), "{path}: {}", failure.1);
    }
}

#[test]
fn test_end_code_trimming_toggle() {
    for (trim, bytes) in [(true, 2 * 5), (false, 6 * 5)] {
        let parser = MockParser::default().with_file(MOVIE, Container::simple(1, 0, 5, 0));
        let (mut session, report) = session_for(parser);
        session
            .load_filter("fin", FilterArgs::new().with("src", MOVIE))
            .unwrap();
        session
            .load_filter("m2psdmx", FilterArgs::new().with("trim_end_code", trim))
            .unwrap();
        session.load_filter("inspect", FilterArgs::new()).unwrap();
        session.run().unwrap();

        assert_eq!(report.lock().of_type(StreamType::Visual)[0].bytes, bytes);
    }
}

#[test]
fn test_back_pressure_bounds_queues() {
    let parser = MockParser::default().with_file(MOVIE, Container::simple(1, 1, 40, 0));
    let (registry, _report) = registry(parser, MockCodecs::default());
    let config = SessionConfig::default().with_idle_tick_limit(8);
    let high = config.pid_buffer.high;
    let mut session = Session::new(Arc::new(registry), config);

    session
        .load_filter("fin", FilterArgs::new().with("src", MOVIE))
        .unwrap();
    let demux = session.load_filter(m2psdmx::NAME, FilterArgs::new()).unwrap();
    let sink = SlowSink::new(3);
    let max_depth = sink.max_depth.clone();
    let received = sink.received.clone();
    let sink = session.add_filter("slow", None, Box::new(sink)).unwrap();
    session.connect(demux, sink).unwrap();

    let run = session.run().unwrap();
    assert!(run.is_complete(), "{run:?}");
    assert_eq!(received.load(Ordering::SeqCst), 80);
    let depth = max_depth.load(Ordering::SeqCst);
    assert!(depth > 1, "sink never fell behind");
    assert!(depth <= high, "queue depth {depth} above high water mark {high}");
}
