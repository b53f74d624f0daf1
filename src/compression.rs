// SPDX-FileCopyrightText: 2025 khpack contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ptr::null_mut;

use libz_rs_sys::*;

use crate::ByteBuffer;

/// Deflate can't expand data by more than this, so anything claiming more is a broken length.
const MAX_INFLATE_RATIO: usize = 1032;

/// Why a zlib stream couldn't be inflated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InflateError {
    /// The stream is broken or incomplete.
    Invalid,
    /// The stream is fine, but doesn't inflate to the expected size.
    LengthMismatch,
}

/// Inflates a zlib stream (with header) into exactly `decompressed_length` bytes.
pub(crate) fn zlib_decompress(
    in_data: &mut [u8],
    decompressed_length: usize,
) -> Result<ByteBuffer, InflateError> {
    if decompressed_length > in_data.len().saturating_mul(MAX_INFLATE_RATIO) {
        return Err(InflateError::LengthMismatch);
    }

    let mut out_data: ByteBuffer = vec![0; decompressed_length];

    unsafe {
        let mut strm = z_stream {
            next_in: null_mut(),
            avail_in: in_data.len() as u32,
            total_in: 0,
            next_out: null_mut(),
            avail_out: 0,
            total_out: 0,
            msg: null_mut(),
            state: null_mut(),
            zalloc: None, // the default alloc is fine
            zfree: None,  // the default free is fine
            opaque: null_mut(),
            data_type: 0,
            adler: 0,
            reserved: 0,
        };

        let ret = inflateInit2_(
            &mut strm,
            15,
            zlibVersion(),
            core::mem::size_of::<z_stream>() as i32,
        );
        if ret != Z_OK {
            return Err(InflateError::Invalid);
        }

        strm.next_in = in_data.as_mut_ptr();
        strm.avail_out = out_data.len() as u32;
        strm.next_out = out_data.as_mut_ptr();

        let ret = inflate(&mut strm, Z_FINISH);
        let total_out = strm.total_out as usize;
        let avail_out = strm.avail_out;

        inflateEnd(&mut strm);

        match ret {
            Z_STREAM_END if total_out == decompressed_length => {}
            Z_STREAM_END => return Err(InflateError::LengthMismatch),
            // the output filled up before the stream ended
            Z_OK | Z_BUF_ERROR if avail_out == 0 => {
                return Err(InflateError::LengthMismatch)
            }
            _ => return Err(InflateError::Invalid),
        }
    }

    Ok(out_data)
}

/// Deflates `data` into a zlib stream, only used to build test fixtures.
#[cfg(test)]
pub(crate) fn zlib_compress(data: &[u8]) -> ByteBuffer {
    use core::ffi::c_ulong;

    unsafe {
        let mut dest_len: c_ulong = compressBound(data.len() as c_ulong);
        let mut dest: ByteBuffer = vec![0; dest_len as usize];

        let ret = compress(
            dest.as_mut_ptr(),
            &mut dest_len,
            data.as_ptr(),
            data.len() as c_ulong,
        );
        assert_eq!(ret, Z_OK);

        dest.truncate(dest_len as usize);
        dest
    }
}
