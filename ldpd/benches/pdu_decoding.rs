//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use ldpd::packet::*;

const DECODE_CXT: DecodeCxt = DecodeCxt {
    pdu_max_len: Pdu::DFLT_MAX_LEN,
    validate_pdu_hdr: None,
    validate_msg_hdr: None,
};

fn pdu_decode(n: u64) {
    // Hello followed by a Label Mapping.
    let bytes = vec![
        0x00, 0x01, 0x00, 0x42, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00,
        0x00, 0x1c, 0x00, 0x00, 0x00, 0x01, 0x04, 0x00, 0x00, 0x04, 0x00, 0x0f,
        0x00, 0x00, 0x04, 0x01, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01, 0x04, 0x02,
        0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x00, 0x18, 0x00, 0x00,
        0x00, 0x39, 0x01, 0x00, 0x00, 0x08, 0x02, 0x00, 0x01, 0x20, 0x01, 0x01,
        0x01, 0x01, 0x02, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x10,
    ];

    for _ in 0..n {
        let _pdu_size = Pdu::get_pdu_size(&bytes, &DECODE_CXT).unwrap();
        Pdu::decode(&bytes, &DECODE_CXT).unwrap();
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("PDU decode", |b| b.iter(|| pdu_decode(black_box(10000))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
