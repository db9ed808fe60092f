use bytes::BytesMut;
use conbridge_frame::{
    decode_log_record, encode_log_record, normalize_command, CommandFrameScanner, LogRecord,
    DEFAULT_MAX_STRING, TERMINATOR,
};
use proptest::prelude::*;

fn contains_terminator(bytes: &[u8]) -> bool {
    bytes.windows(TERMINATOR.len()).any(|w| w == TERMINATOR)
}

/// Payload bytes biased toward terminator fragments.
fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop_oneof![
            Just(b'<'),
            Just(b'E'),
            Just(b'O'),
            Just(b'L'),
            Just(b'>'),
            Just(0u8),
            any::<u8>(),
        ],
        0..64,
    )
    .prop_filter("payload must not contain the terminator", |p| {
        !contains_terminator(p)
    })
}

fn split_at_points(bytes: &[u8], mut points: Vec<usize>) -> Vec<&[u8]> {
    points.iter_mut().for_each(|p| *p %= bytes.len() + 1);
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(&bytes[start..point]);
        start = point;
    }
    chunks.push(&bytes[start..]);
    chunks
}

proptest! {
    /// Property: any split of `payload + terminator` yields exactly that payload once.
    #[test]
    fn split_terminator_yields_one_command(
        payload in arb_payload(),
        points in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let mut wire = payload.clone();
        wire.extend_from_slice(TERMINATOR);

        let mut scanner = CommandFrameScanner::new();
        let mut commands = Vec::new();
        for chunk in split_at_points(&wire, points) {
            commands.extend(scanner.feed(chunk).expect("default policy never fails"));
        }

        prop_assert_eq!(commands.len(), 1);
        prop_assert_eq!(commands[0].as_str(), &*String::from_utf8_lossy(&payload));
        prop_assert_eq!(scanner.pending_len(), 0);
    }

    /// Property: k terminators in the stream yield k commands, in order.
    #[test]
    fn k_terminators_yield_k_commands(
        payloads in prop::collection::vec(arb_payload(), 0..10),
        chunk_size in 1usize..32,
    ) {
        let mut wire = Vec::new();
        for payload in &payloads {
            wire.extend_from_slice(payload);
            wire.extend_from_slice(TERMINATOR);
        }
        // Payload joined with the previous terminator cannot form a new one:
        // the terminator has no self-overlap.
        prop_assume!(
            wire.windows(TERMINATOR.len()).filter(|w| *w == TERMINATOR).count() == payloads.len()
        );

        let mut scanner = CommandFrameScanner::new();
        let mut commands = Vec::new();
        for chunk in wire.chunks(chunk_size) {
            commands.extend(scanner.feed(chunk).expect("default policy never fails"));
        }

        prop_assert_eq!(commands.len(), payloads.len());
        for (command, payload) in commands.iter().zip(&payloads) {
            prop_assert_eq!(command.as_str(), &*String::from_utf8_lossy(payload));
        }
    }

    /// Property: normalization ends in exactly one newline and is idempotent.
    #[test]
    fn normalize_is_idempotent(raw in ".{0,40}\n{0,3}") {
        let once = normalize_command(&raw);
        prop_assert!(once.ends_with('\n'));
        prop_assert!(!once.ends_with("\n\n"));
        prop_assert_eq!(normalize_command(&once), once.clone());
    }

    /// Property: the message field survives encode/decode unchanged.
    #[test]
    fn record_message_round_trips(
        message in ".{0,200}",
        channel_name in "[A-Za-z]{0,16}",
        channel_id in any::<i32>(),
        severity in any::<i32>(),
        color in any::<i32>(),
    ) {
        let record = LogRecord {
            channel_id,
            severity,
            channel_name,
            color,
            message: message.clone(),
        };
        let mut buf = BytesMut::from(&encode_log_record(&record)[..]);
        let decoded = decode_log_record(&mut buf, DEFAULT_MAX_STRING)
            .expect("decode should succeed")
            .expect("record should be complete");

        prop_assert_eq!(decoded.message, message);
        prop_assert_eq!(decoded.channel_id, channel_id);
        prop_assert!(buf.is_empty());
    }
}
