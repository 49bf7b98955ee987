// tests/log_buffer.rs

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use sigil::log_buffer::{LogBuffer, DEFAULT_MAX_LOG_LINES};
use sigil::types::StreamKind;

#[test]
fn evicts_oldest_line_first() {
    let buf = LogBuffer::new(3);
    for i in 0..4 {
        buf.append(1, StreamKind::Stdout, format!("line{i}")).unwrap();
    }

    let lines: Vec<String> = buf.read(1).unwrap().into_iter().map(|l| l.line).collect();
    assert_eq!(lines, ["line1", "line2", "line3"]);
}

#[test]
fn bounds_are_per_command() {
    let buf = LogBuffer::new(2);
    for i in 0..5 {
        buf.append(1, StreamKind::Stdout, format!("a{i}")).unwrap();
    }
    buf.append(2, StreamKind::Stderr, "b0").unwrap();

    assert_eq!(buf.len(1).unwrap(), 2);
    assert_eq!(buf.len(2).unwrap(), 1);
    assert_eq!(buf.read(2).unwrap()[0].stream, StreamKind::Stderr);
}

#[test]
fn clear_only_touches_one_command() {
    let buf = LogBuffer::default();
    assert_eq!(buf.max_lines(), DEFAULT_MAX_LOG_LINES);

    buf.append(1, StreamKind::Stdout, "x").unwrap();
    buf.append(2, StreamKind::Stdout, "y").unwrap();
    buf.clear(1).unwrap();

    assert!(!buf.has_logs(1).unwrap());
    assert!(buf.has_logs(2).unwrap());
}

#[test]
fn unknown_command_reads_empty() {
    let buf = LogBuffer::new(5);
    assert!(buf.read(99).unwrap().is_empty());
    assert!(!buf.has_logs(99).unwrap());
    buf.clear(99).unwrap();
}

#[test]
fn zero_bound_is_treated_as_one() {
    let buf = LogBuffer::new(0);
    buf.append(1, StreamKind::Stdout, "a").unwrap();
    buf.append(1, StreamKind::Stdout, "b").unwrap();
    assert_eq!(buf.read(1).unwrap()[0].line, "b");
}

#[test]
fn concurrent_producers_keep_their_own_order() {
    let buf = Arc::new(LogBuffer::new(10_000));

    let producers: Vec<_> = [StreamKind::Stdout, StreamKind::Stderr]
        .into_iter()
        .map(|stream| {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                for i in 0..1000 {
                    buf.append(7, stream, i.to_string()).unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let lines = buf.read(7).unwrap();
    assert_eq!(lines.len(), 2000);
    for stream in [StreamKind::Stdout, StreamKind::Stderr] {
        let seq: Vec<usize> = lines
            .iter()
            .filter(|l| l.stream == stream)
            .map(|l| l.line.parse().unwrap())
            .collect();
        assert_eq!(seq, (0..1000).collect::<Vec<_>>());
    }
}

proptest! {
    #[test]
    fn never_exceeds_bound_and_keeps_newest(
        bound in 1usize..50,
        count in 0usize..200,
    ) {
        let buf = LogBuffer::new(bound);
        for i in 0..count {
            buf.append(1, StreamKind::Stdout, i.to_string()).unwrap();
            prop_assert!(buf.len(1).unwrap() <= bound);
        }

        let kept: Vec<usize> = buf.read(1).unwrap().iter().map(|l| l.line.parse().unwrap()).collect();
        let expected: Vec<usize> = (count.saturating_sub(bound)..count).collect();
        prop_assert_eq!(kept, expected);
    }
}
