//! In-process still image to single-frame GIF conversion

use crate::error::ConversionError;
use crate::origin::partial_path;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, ImageReader};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Convert `src` into a looping single-frame GIF at `dest`
///
/// Decoding and encoding run on the blocking pool under `timeout`. The GIF is
/// written to a sibling `.part` file and renamed into place only when the task
/// finished in time, so an abandoned encode never leaves `dest` behind.
pub async fn convert_still(
    src: PathBuf,
    dest: PathBuf,
    frame_delay_ms: u32,
    timeout: Duration,
) -> Result<(), ConversionError> {
    let partial = partial_path(&dest);
    let abandoned = Arc::new(AtomicBool::new(false));

    let task = {
        let partial = partial.clone();
        let abandoned = Arc::clone(&abandoned);
        tokio::task::spawn_blocking(move || {
            let result = encode_still(&src, &partial, frame_delay_ms);
            if abandoned.load(Ordering::SeqCst) {
                std::fs::remove_file(&partial).ok();
            }
            result
        })
    };

    let result = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ConversionError::Image(format!("conversion task failed: {e}"))),
        Err(_) => {
            // The blocking task cannot be cancelled; it cleans up after itself
            abandoned.store(true, Ordering::SeqCst);
            Err(ConversionError::Timeout {
                program: "image".to_string(),
                timeout,
            })
        }
    };

    match result {
        Ok(()) => tokio::fs::rename(&partial, &dest).await.map_err(|e| {
            ConversionError::Image(format!("cannot move {} into place: {e}", partial.display()))
        }),
        Err(e) => {
            tokio::fs::remove_file(&partial).await.ok();
            Err(e)
        }
    }
}

fn encode_still(src: &Path, dest: &Path, frame_delay_ms: u32) -> Result<(), ConversionError> {
    let image_err = |e: image::ImageError| ConversionError::Image(e.to_string());

    // Sources are named by origin extension, which is not always accurate
    let rgba = ImageReader::open(src)
        .map_err(|e| ConversionError::Image(format!("cannot open {}: {e}", src.display())))?
        .with_guessed_format()
        .map_err(|e| ConversionError::Image(e.to_string()))?
        .decode()
        .map_err(image_err)?
        .to_rgba8();

    let file = File::create(dest)
        .map_err(|e| ConversionError::Image(format!("cannot create {}: {e}", dest.display())))?;

    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder.set_repeat(Repeat::Infinite).map_err(image_err)?;
    encoder
        .encode_frame(Frame::from_parts(
            rgba,
            0,
            0,
            Delay::from_numer_denom_ms(frame_delay_ms, 1),
        ))
        .map_err(image_err)?;
    Ok(())
}
