//! Frame assembly: write rasterised pages as one multi-page TIFF.
//!
//! Each [`RasterFrame`] becomes one image file directory (IFD) in input order,
//! RGB 8-bit, compressed with the configured lossless scheme. The `image`
//! crate's TIFF writer only emits a single uncompressed frame, so this stage
//! talks to the `tiff` codec directly.

use crate::config::{ConversionConfig, DeflateLevel, TiffCompression};
use crate::error::ConvertError;
use crate::output::RasterFrame;
use std::io::{Cursor, Seek, Write};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::compression::{self, Compression, Deflate, Lzw, Packbits};
use tiff::encoder::{colortype, Rational, TiffEncoder};
use tiff::tags::{ResolutionUnit, Tag};
use tiff::ColorType;
use tracing::{debug, info};

const SOFTWARE: &str = concat!("pdf2tiff ", env!("CARGO_PKG_VERSION"));

/// TIFF 6.0 `PageNumber` (297): page index and total page count.
const TAG_PAGE_NUMBER: Tag = Tag::Unknown(297);

/// Encode `frames` as a multi-page TIFF, frame `i` in IFD `i`.
///
/// Fails with [`ConvertError::EmptyDocument`] on an empty slice and with
/// [`ConvertError::Encode`] if a frame's buffer does not match its size or the
/// encoder fails. Nothing is returned unless every frame was written.
pub fn assemble(frames: &[RasterFrame], config: &ConversionConfig) -> Result<Vec<u8>, ConvertError> {
    if frames.is_empty() {
        return Err(ConvertError::EmptyDocument);
    }
    for (i, frame) in frames.iter().enumerate() {
        check_frame(i, frame)?;
    }

    let resolution = config.embed_resolution.then(|| {
        let (dx, dy) = config.scale.dpi();
        (to_rational(dx), to_rational(dy))
    });

    let raw: usize = frames.iter().map(|f| f.pixels.len()).sum();
    let mut buf = Cursor::new(Vec::with_capacity(raw / 4));
    {
        let mut encoder = TiffEncoder::new(&mut buf)?;
        let total = frames.len();
        for (i, frame) in frames.iter().enumerate() {
            let page = PageTag::new(i, total);
            match config.compression {
                TiffCompression::Deflate => write_frame(
                    &mut encoder,
                    frame,
                    page,
                    resolution.as_ref(),
                    Deflate::with_level(deflate_level(config.deflate_level)),
                )?,
                TiffCompression::Lzw => write_frame(
                    &mut encoder,
                    frame,
                    page,
                    resolution.as_ref(),
                    Lzw::default(),
                )?,
                TiffCompression::PackBits => write_frame(
                    &mut encoder,
                    frame,
                    page,
                    resolution.as_ref(),
                    Packbits::default(),
                )?,
            }
            debug!("Wrote frame {}/{} ({}x{})", i + 1, total, frame.width, frame.height);
        }
    }

    let tiff = buf.into_inner();
    info!(
        "Assembled {} frames: {} raw bytes → {} TIFF bytes ({:?})",
        frames.len(),
        raw,
        tiff.len(),
        config.compression
    );
    Ok(tiff)
}

fn check_frame(index: usize, frame: &RasterFrame) -> Result<(), ConvertError> {
    let expected = RasterFrame::expected_len(frame.width, frame.height);
    if frame.width == 0 || frame.height == 0 || frame.pixels.len() != expected {
        return Err(ConvertError::Encode {
            detail: format!(
                "frame {} is {}x{} with {} bytes (expected {})",
                index + 1,
                frame.width,
                frame.height,
                frame.pixels.len(),
                expected
            ),
        });
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct PageTag {
    index: u16,
    total: u16,
}

impl PageTag {
    fn new(index: usize, total: usize) -> Self {
        Self {
            index: u16::try_from(index).unwrap_or(u16::MAX),
            total: u16::try_from(total).unwrap_or(u16::MAX),
        }
    }
}

fn write_frame<W: Write + Seek, D: Compression>(
    encoder: &mut TiffEncoder<W>,
    frame: &RasterFrame,
    page: PageTag,
    resolution: Option<&(Rational, Rational)>,
    compression: D,
) -> Result<(), ConvertError> {
    let mut image = encoder.new_image_with_compression::<colortype::RGB8, D>(
        frame.width,
        frame.height,
        compression,
    )?;

    // The encoder always writes 1/1 resolution tags; without a DPI the unit
    // is left as None so readers treat them as an aspect ratio only.
    match resolution {
        Some((x, y)) => {
            image.resolution_unit(ResolutionUnit::Inch);
            image.x_resolution(x.clone());
            image.y_resolution(y.clone());
        }
        None => image.resolution_unit(ResolutionUnit::None),
    }
    image
        .encoder()
        .write_tag(TAG_PAGE_NUMBER, &[page.index, page.total][..])?;
    image.encoder().write_tag(Tag::Software, SOFTWARE)?;

    image.write_data(&frame.pixels)?;
    Ok(())
}

fn deflate_level(level: DeflateLevel) -> compression::DeflateLevel {
    match level {
        DeflateLevel::Fast => compression::DeflateLevel::Fast,
        DeflateLevel::Balanced => compression::DeflateLevel::Balanced,
        DeflateLevel::Best => compression::DeflateLevel::Best,
    }
}

/// Whole DPI values are stored as `n/1`, fractional ones in thousandths.
fn to_rational(dpi: f64) -> Rational {
    let whole = dpi.round();
    if (dpi - whole).abs() < 1e-6 {
        Rational {
            n: whole as u32,
            d: 1,
        }
    } else {
        Rational {
            n: (dpi * 1000.0).round() as u32,
            d: 1000,
        }
    }
}

/// Decode a TIFF produced by [`assemble`] back into frames, in IFD order.
///
/// Only RGB 8-bit images are accepted; anything else is reported as
/// [`ConvertError::Encode`].
pub fn read_frames(tiff: &[u8]) -> Result<Vec<RasterFrame>, ConvertError> {
    let readback = |e: tiff::TiffError| ConvertError::Encode {
        detail: format!("TIFF read-back failed: {e}"),
    };

    let mut decoder = Decoder::new(Cursor::new(tiff)).map_err(readback)?;
    let mut frames = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().map_err(readback)?;
        match decoder.colortype().map_err(readback)? {
            ColorType::RGB(8) => {}
            other => {
                return Err(ConvertError::Encode {
                    detail: format!("frame {} has color type {:?}", frames.len() + 1, other),
                })
            }
        }
        let pixels = match decoder.read_image().map_err(readback)? {
            DecodingResult::U8(pixels) => pixels,
            _ => {
                return Err(ConvertError::Encode {
                    detail: format!("frame {} is not 8-bit", frames.len() + 1),
                })
            }
        };
        frames.push(RasterFrame::new(width, height, pixels));

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(readback)?;
    }
    Ok(frames)
}
