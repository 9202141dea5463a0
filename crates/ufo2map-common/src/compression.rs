// compression.rs -- Run-length packing for the routing lump
//
// The stream is a sequence of blocks terminated by a zero byte:
//   0x80 | n, value   -> value repeated n + 1 times
//   n (1..=0x7F), ... -> n literal bytes follow

/// Longest run (minus one) or literal stretch a single block can describe.
const MAX_BLOCK: usize = 0x7F;

/// Compress `data`, appending the packed stream (including the terminating
/// zero) to `dest`. Returns the number of bytes appended.
pub fn compress_routing(data: &[u8], dest: &mut Vec<u8>) -> usize {
    let start_len = dest.len();
    let end = data.len();
    let mut i = 0;

    while i < end {
        if i + 1 < end && data[i] == data[i + 1] {
            // repetitions
            let val = data[i];
            i += 1;
            let mut c = 0;
            while i + 1 < end && data[i] == data[i + 1] && c < MAX_BLOCK {
                i += 1;
                c += 1;
            }
            dest.push(c as u8 | 0x80);
            dest.push(val);
        } else {
            // literals
            let count_pos = dest.len();
            dest.push(0);
            let mut c = 0;
            while ((i + 1 < end && data[i] != data[i + 1]) || i == end - 1) && c < MAX_BLOCK {
                dest.push(data[i]);
                i += 1;
                c += 1;
            }
            dest[count_pos] = c as u8;
        }
    }

    // terminate compressed data
    dest.push(0);

    dest.len() - start_len
}

/// Unpack one terminated stream from the front of `src`.
///
/// Returns the unpacked bytes and how many bytes of `src` were consumed,
/// or `None` if the stream is truncated.
pub fn decompress_routing(src: &[u8]) -> Option<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;

    loop {
        let c = *src.get(pos)?;
        pos += 1;

        if c == 0 {
            return Some((out, pos));
        }

        if c & 0x80 != 0 {
            let val = *src.get(pos)?;
            pos += 1;
            let n = (c & 0x7F) as usize + 1;
            out.resize(out.len() + n, val);
        } else {
            let n = c as usize;
            let bytes = src.get(pos..pos + n)?;
            out.extend_from_slice(bytes);
            pos += n;
        }
    }
}
