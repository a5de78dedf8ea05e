//! Duration probe for RIFF/WAVE files.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Reads the `fmt ` and `data` chunks and returns the duration in seconds.
///
/// Returns `Ok(None)` when the input is not a WAVE file or lacks either
/// chunk.
pub fn wav_duration<R: Read + Seek>(reader: &mut R) -> io::Result<Option<f64>> {
    let mut header = [0u8; 12];
    if reader.read_exact(&mut header).is_err() {
        return Ok(None);
    }
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Ok(None);
    }

    let mut byte_rate: Option<u32> = None;
    let mut data_size: Option<u32> = None;
    let mut chunk = [0u8; 8];

    while byte_rate.is_none() || data_size.is_none() {
        if reader.read_exact(&mut chunk).is_err() {
            break;
        }
        let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
        match &id {
            b"fmt " => {
                let mut fmt = [0u8; 16];
                if size < 16 || reader.read_exact(&mut fmt).is_err() {
                    return Ok(None);
                }
                byte_rate = Some(u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]));
                skip(reader, u64::from(size - 16) + u64::from(size % 2))?;
            }
            b"data" => {
                data_size = Some(size);
                skip(reader, u64::from(size) + u64::from(size % 2))?;
            }
            _ => skip(reader, u64::from(size) + u64::from(size % 2))?,
        }
    }

    match (byte_rate, data_size) {
        (Some(rate), Some(size)) if rate > 0 => Ok(Some(f64::from(size) / f64::from(rate))),
        _ => Ok(None),
    }
}

fn skip<R: Seek>(reader: &mut R, bytes: u64) -> io::Result<()> {
    if bytes > 0 {
        reader.seek(SeekFrom::Current(bytes as i64))?;
    }
    Ok(())
}

/// Probes a WAVE file on disk without blocking the runtime.
pub async fn probe_wav_file(path: &Path) -> io::Result<Option<f64>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        wav_duration(&mut file)
    })
    .await
    .map_err(io::Error::other)?
}
