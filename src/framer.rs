// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! SLIP byte-stuffing framing over a byte-oriented transport (serial
//! line, TCP stream) so that a stream-oriented medium can carry discrete
//! envelopes the same way a datagram transport does natively.

use crate::error::Error;
use std::io::{Read, Write};

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Wraps any `Read + Write` byte stream and exposes whole-frame
/// `send`/`recv` on top of it, stuffing/unstuffing `END`/`ESC` bytes so a
/// frame boundary survives a stream transport that has no framing of its
/// own.
pub struct SlipFramer<T> {
    inner: T,
    max_payload: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxMode {
    Normal,
    Escape,
    /// A frame in progress was discarded (overflow or a malformed escape);
    /// every byte up to and including the next `END` is dropped so the
    /// following frame doesn't inherit the discarded frame's tail bytes.
    Discard,
}

impl<T: Read + Write> SlipFramer<T> {
    pub fn new(inner: T, max_payload: usize) -> SlipFramer<T> {
        SlipFramer { inner, max_payload }
    }

    /// Stuff `frame` and write `END <stuffed body> END` to the underlying
    /// stream in a single call.
    pub fn send(&mut self, frame: &[u8]) -> Result<(), Error> {
        let mut out = Vec::with_capacity(frame.len() * 2 + 2);
        out.push(END);
        for &b in frame {
            match b {
                END => {
                    out.push(ESC);
                    out.push(ESC_END);
                }
                ESC => {
                    out.push(ESC);
                    out.push(ESC_ESC);
                }
                _ => out.push(b),
            }
        }
        out.push(END);
        self.inner.write_all(&out)?;
        Ok(())
    }

    /// Read and unstuff one frame, reading the underlying stream one byte
    /// at a time until a frame-terminating `END` is seen with a
    /// non-empty accumulated buffer. Overflowing `max_payload` or an
    /// escape byte followed by anything other than `ESC_END`/`ESC_ESC`
    /// discards the frame in progress and enters `Discard` until the next
    /// `END`, so the tail of a dropped frame never bleeds into the next
    /// one, matching the original framer's resynchronization behavior.
    pub fn recv(&mut self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(self.max_payload.min(4096));
        let mut mode = RxMode::Normal;
        let mut byte = [0u8; 1];
        loop {
            self.inner.read_exact(&mut byte)?;
            let b = byte[0];
            match mode {
                RxMode::Normal => match b {
                    END => {
                        if !buf.is_empty() {
                            return Ok(buf);
                        }
                    }
                    ESC => mode = RxMode::Escape,
                    _ => {
                        if buf.len() >= self.max_payload {
                            buf.clear();
                            mode = RxMode::Discard;
                        } else {
                            buf.push(b);
                        }
                    }
                },
                RxMode::Escape => {
                    mode = RxMode::Normal;
                    match b {
                        ESC_END => buf.push(END),
                        ESC_ESC => buf.push(ESC),
                        _ => {
                            buf.clear();
                            mode = RxMode::Discard;
                        }
                    }
                }
                RxMode::Discard => {
                    if b == END {
                        mode = RxMode::Normal;
                    }
                }
            }
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A `Read + Write` adapter over a single in-memory buffer, so a
    /// frame written by `send` can be read back by `recv` in the same
    /// test without a real socket or pipe.
    struct Loop {
        data: Cursor<Vec<u8>>,
    }

    impl Read for Loop {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl Write for Loop {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.get_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn loopback() -> SlipFramer<Loop> {
        SlipFramer::new(
            Loop {
                data: Cursor::new(Vec::new()),
            },
            256,
        )
    }

    #[test]
    fn roundtrips_plain_payload() {
        let mut f = loopback();
        f.send(b"hello").unwrap();
        f.inner.data.set_position(0);
        assert_eq!(f.recv().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn stuffs_end_and_esc_bytes() {
        let mut f = loopback();
        let payload = vec![END, ESC, 1, 2];
        f.send(&payload).unwrap();
        f.inner.data.set_position(0);
        assert_eq!(f.recv().unwrap(), payload);
    }

    #[test]
    fn skips_empty_frames_between_end_markers() {
        let mut f = loopback();
        f.inner.data.get_mut().extend_from_slice(&[END, END, END, 7, 8, END]);
        f.inner.data.set_position(0);
        assert_eq!(f.recv().unwrap(), vec![7, 8]);
    }

    #[test]
    fn discards_overflowing_frame_until_next_end() {
        let mut f = SlipFramer::new(
            Loop {
                data: Cursor::new(Vec::new()),
            },
            4,
        );
        // The first frame's body (5 bytes) overflows max_payload(4) and
        // must be dropped in full; framing should resynchronise on the
        // END that follows rather than splicing its tail into the next
        // frame.
        f.inner
            .data
            .get_mut()
            .extend_from_slice(&[END, 1, 2, 3, 4, 5, END, 9, 9, END]);
        f.inner.data.set_position(0);
        assert_eq!(f.recv().unwrap(), vec![9, 9]);
    }

    #[test]
    fn discards_frame_on_malformed_escape_until_next_end() {
        let mut f = loopback();
        // ESC followed by a byte that is neither ESC_END nor ESC_ESC is a
        // malformed escape; the partial frame must be dropped, not mixed
        // into the next one.
        f.inner
            .data
            .get_mut()
            .extend_from_slice(&[END, 1, 2, ESC, 0x00, 3, 4, END, 5, 6, END]);
        f.inner.data.set_position(0);
        assert_eq!(f.recv().unwrap(), vec![5, 6]);
    }
}
