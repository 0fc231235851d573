// Frame Codec Tests
// Black-box coverage of the wire encoding, block segmentation, and
// response parsing, exercised only through the public `hsm_proxy::frame`
// API.

use hsm_proxy::frame::{encode, parse_response, segment, Op, Response, BLOCK};

#[test]
fn encode_lays_out_op_count_and_length_prefixed_args() {
    let body = encode(Op::ValidSignature, &[vec![1, 2], vec![3, 4, 5]]).unwrap();
    assert_eq!(
        &body[..],
        &[
            Op::ValidSignature.code(),
            2,
            0x00, 0x02, 1, 2,
            0x00, 0x03, 3, 4, 5,
        ]
    );
}

#[test]
fn encode_rejects_an_argument_over_the_u16_length_limit() {
    let oversized = vec![0u8; 65536];
    let err = encode(Op::SignBytes, &[oversized]).unwrap_err();
    assert!(matches!(err, hsm_proxy::error::ProxyError::ArgumentTooLarge { .. }));
}

#[test]
fn segment_fits_a_small_body_into_a_single_block() {
    let body = encode(Op::DigestBytes, &[vec![0xAB; 16]]).unwrap();
    let blocks = segment(&body);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0], body);
}

#[test]
fn segment_splits_the_spec_worked_example_into_extra_blocks_then_primary() {
    // 1200-byte body: BLOCK (510) leaves 1200 - 2 = 1198 bytes of
    // non-header payload to place, producing ceil(1198/510) - 1 = 2
    // extra blocks ahead of the primary block.
    let body = vec![0x42; 1200];
    let blocks = segment(&body);
    assert_eq!(blocks.len(), 3);

    // Extra blocks carry a [0x00, k] continuation header, descending.
    assert_eq!(&blocks[0][..2], &[0x00, 2]);
    assert_eq!(&blocks[1][..2], &[0x00, 1]);

    // The primary block is the first BLOCK+2 bytes of the body verbatim,
    // with no continuation header of its own.
    assert_eq!(blocks[2], body[..BLOCK + 2]);

    // Reassembling header-stripped extra blocks (in ascending k) plus the
    // primary block's tail must recover every byte after the first
    // BLOCK + 2.
    let mut reassembled = Vec::new();
    reassembled.extend_from_slice(&blocks[1][2..]); // k = 1
    reassembled.extend_from_slice(&blocks[0][2..]); // k = 2
    assert_eq!(reassembled.len() + BLOCK + 2, body.len());
}

#[test]
fn segment_boundary_at_exactly_one_block_plus_header_needs_no_extra_blocks() {
    let body = vec![0x01; BLOCK + 2];
    assert_eq!(segment(&body).len(), 1);

    let body = vec![0x01; BLOCK + 3];
    assert_eq!(segment(&body).len(), 2);
}

#[test]
fn parse_response_distinguishes_bool_error_and_bytes() {
    assert_eq!(parse_response(&[0]), Response::Bool(false));
    assert_eq!(parse_response(&[1]), Response::Bool(true));
    assert_eq!(parse_response(&[2]), Response::Error(2));
    assert_eq!(parse_response(&[0xAA; 32]), Response::Bytes(vec![0xAA; 32]));
}

#[test]
fn parse_response_treats_every_length_one_payload_above_one_as_an_error_code() {
    for code in 2u8..=255 {
        assert_eq!(parse_response(&[code]), Response::Error(code));
    }
}
