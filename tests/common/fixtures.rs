//! Source payloads and fake converter executables

use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Encoded PNG of a solid square
pub fn png_bytes(size: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbaImage::from_pixel(size, size, Rgba([240, 180, 20, 255]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Payload of exactly `len` bytes
pub fn sized_payload(len: usize) -> Vec<u8> {
    vec![0x47; len]
}

/// Write an executable shell script
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stand-in for ffmpeg: copies the input (`-y -loglevel error -i <in> <out>`)
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_script(dir, "ffmpeg", "cp \"$5\" \"$6\"")
}

/// Batch renderer command copying every `*.tgs` in `{dir}` to `<file>.gif`
pub fn fake_batch_renderer() -> Vec<String> {
    vec![
        "sh".into(),
        "-c".into(),
        "for f in {dir}/*.tgs; do [ -e \"$f\" ] && cp \"$f\" \"$f.gif\"; done; true".into(),
    ]
}
