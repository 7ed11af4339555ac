//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
#![no_main]

use ldpd::packet::{DecodeCxt, Pdu};
use libfuzzer_sys::fuzz_target;

const SESSION_CXT: DecodeCxt = DecodeCxt {
    pdu_max_len: Pdu::MAX_LEN,
    validate_pdu_hdr: None,
    validate_msg_hdr: None,
};

fuzz_target!(|data: &[u8]| {
    let mut data = data;
    while let Ok(pdu_size) = Pdu::get_pdu_size(data, &SESSION_CXT) {
        let _ = Pdu::decode(&data[..pdu_size], &SESSION_CXT);
        data = &data[pdu_size..];
    }
});
