//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};

// Scratch buffer reused by the packet encoders of the current thread.
thread_local!(
    pub static TLS_BUF: RefCell<BytesMut> =
        RefCell::new(BytesMut::with_capacity(4096))
);

// Extension methods for Bytes.
pub trait BytesExt {
    /// Gets an IPv4 addr from `self` in big-endian byte order, failing when
    /// fewer than 4 bytes remain.
    ///
    /// The current position is advanced by 4 on success.
    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError>;
}

// Extension methods for BytesMut.
pub trait BytesMutExt {
    /// Writes an IPv4 addr to `self` in big-endian byte order.
    ///
    /// The current position is advanced by 4.
    fn put_ipv4(&mut self, addr: &Ipv4Addr);

    /// Writes the first `len` octets of an IPv4 addr to `self`.
    ///
    /// Used by encodings that carry a prefix in the minimum number of octets.
    fn put_ipv4_prefix(&mut self, addr: &Ipv4Addr, len: usize);
}

// ===== impl Bytes =====

impl BytesExt for Bytes {
    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError> {
        self.try_get_u32().map(Ipv4Addr::from)
    }
}

// ===== impl BytesMut =====

impl BytesMutExt for BytesMut {
    fn put_ipv4(&mut self, addr: &Ipv4Addr) {
        self.put_u32((*addr).into())
    }

    fn put_ipv4_prefix(&mut self, addr: &Ipv4Addr, len: usize) {
        let len = std::cmp::min(len, 4);
        self.put_slice(&addr.octets()[0..len]);
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_get_ipv4_short_buffer() {
        let mut buf = Bytes::from_static(&[10, 0, 0]);
        assert!(buf.try_get_ipv4().is_err());

        let mut buf = Bytes::from_static(&[10, 0, 0, 1]);
        assert_eq!(buf.try_get_ipv4().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert!(buf.is_empty());
    }

    #[test]
    fn put_ipv4_prefix_truncates() {
        let mut buf = BytesMut::new();
        buf.put_ipv4_prefix(&Ipv4Addr::new(192, 168, 10, 0), 3);
        assert_eq!(&buf[..], &[192, 168, 10]);
    }
}
