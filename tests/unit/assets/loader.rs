use std::io::Cursor;

use futures::executor::block_on;

use super::*;

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "framescroll_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

#[test]
fn normalize_strips_root_and_dots() {
    assert_eq!(
        normalize_locator("/images/./seq//f0001.webp").unwrap(),
        "images/seq/f0001.webp"
    );
    assert_eq!(normalize_locator("a\\b.png").unwrap(), "a/b.png");
    assert!(normalize_locator("../secret.png").is_err());
    assert!(normalize_locator("/").is_err());
}

#[test]
fn fs_loader_decodes_png_from_root() {
    let tmp = temp_dir("fs_loader_png");
    std::fs::create_dir_all(tmp.join("seq")).unwrap();

    let img = image::RgbaImage::from_raw(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 255]).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    std::fs::write(tmp.join("seq/f0001.png"), &buf).unwrap();

    let loader = FsFrameLoader::new(&tmp);
    let frame = block_on(loader.load(FrameIndex(1), "/seq/f0001.png")).unwrap();
    assert_eq!((frame.width, frame.height), (2, 1));
    assert_eq!(frame.pixel(1, 0), [0, 0, 255, 255]);

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn fs_loader_reports_missing_and_corrupt_frames() {
    let tmp = temp_dir("fs_loader_missing");
    std::fs::create_dir_all(&tmp).unwrap();
    std::fs::write(tmp.join("bad0002.png"), b"garbage").unwrap();

    let loader = FsFrameLoader::new(&tmp);
    let missing = block_on(loader.load(FrameIndex(1), "bad0001.png")).unwrap_err();
    assert_eq!(missing.index, FrameIndex(1));
    assert!(missing.reason.contains("read"));

    let corrupt = block_on(loader.load(FrameIndex(2), "bad0002.png")).unwrap_err();
    assert_eq!(corrupt.index, FrameIndex(2));
    assert!(corrupt.reason.contains("decode"));

    let escaped = block_on(loader.load(FrameIndex(3), "../x.png")).unwrap_err();
    assert!(escaped.reason.contains(".."));

    std::fs::remove_dir_all(&tmp).ok();
}
