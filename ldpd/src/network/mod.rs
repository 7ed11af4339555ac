//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod tcp;
pub mod udp;

// Well-known port used by both discovery and session transport.
pub const LDP_PORT: u16 = 646;
