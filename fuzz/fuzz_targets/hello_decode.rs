//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//
#![no_main]

use ldpd::packet::{DecodeCxt, Pdu};
use libfuzzer_sys::fuzz_target;

const DISCOVERY_CXT: DecodeCxt = DecodeCxt {
    pdu_max_len: Pdu::DFLT_MAX_LEN,
    validate_pdu_hdr: None,
    validate_msg_hdr: None,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(pdu_size) = Pdu::get_pdu_size(data, &DISCOVERY_CXT) {
        let _ = Pdu::decode(&data[..pdu_size], &DISCOVERY_CXT);
    }
});
