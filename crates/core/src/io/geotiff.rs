//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate directly; georeferencing is carried in the
//! ModelPixelScale and ModelTiepoint tags. Single-band rasters only, which
//! is all the delineator consumes (D8 direction grids, accumulation grids)
//! and produces (watershed masks).

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, Gray8};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

/// Read a single-band GeoTIFF file into a Raster.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let mut decoder =
        Decoder::new(file).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;
    debug!(rows, cols, "decoding GeoTIFF");

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_buffer(&buf),
        DecodingResult::U16(buf) => cast_buffer(&buf),
        DecodingResult::U32(buf) => cast_buffer(&buf),
        DecodingResult::I8(buf) => cast_buffer(&buf),
        DecodingResult::I16(buf) => cast_buffer(&buf),
        DecodingResult::I32(buf) => cast_buffer(&buf),
        DecodingResult::F32(buf) => cast_buffer(&buf),
        DecodingResult::F64(buf) => cast_buffer(&buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    Ok(raster)
}

fn cast_buffer<S, T>(buf: &[S]) -> Vec<T>
where
    S: Copy + num_traits::NumCast,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// Attempt to read a GeoTransform from the ModelPixelScale + ModelTiepoint
/// tag pair.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];

        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;

/// Extract the EPSG code from the GeoKeyDirectory, if present.
///
/// Entries are groups of four shorts (key id, tag location, count, value)
/// after a four-short header; a short-valued key stores its value inline
/// with tag location 0. 32767 is "user-defined" and carries no code.
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder
        .get_tag_u32_vec(Tag::GeoKeyDirectoryTag)
        .ok()?;

    for entry in keys.chunks_exact(4).skip(1) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if (key == GEOGRAPHIC_TYPE_KEY || key == PROJECTED_CS_TYPE_KEY)
            && location == 0
            && value != 0
            && value != 32767
        {
            return Some(CRS::from_epsg(value));
        }
    }

    None
}

/// Write a Raster to a GeoTIFF file as 32-bit float.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut encoder =
        TiffEncoder::new(file).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = *raster.transform();
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale_values(&gt)[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint_values(&gt)[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &GEOKEYS[..])
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

/// Write a Raster<u8> to a GeoTIFF file as 8-bit grayscale.
///
/// Used for watershed masks and D8 grids, where 32-bit float would waste
/// space and lose the exact integer codes on tools that truncate.
pub fn write_geotiff_u8<P: AsRef<Path>>(raster: &Raster<u8>, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut encoder =
        TiffEncoder::new(file).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let data: Vec<u8> = raster.data().iter().copied().collect();

    let mut image = encoder
        .new_image::<Gray8>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = *raster.transform();
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale_values(&gt)[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint_values(&gt)[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &GEOKEYS[..])
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

fn scale_values(gt: &GeoTransform) -> [f64; 3] {
    [gt.pixel_width, gt.pixel_height.abs(), 0.0]
}

fn tiepoint_values(gt: &GeoTransform) -> [f64; 6] {
    [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0]
}

/// Minimal GeoKeyDirectory: GTModelTypeGeoKey=2 (Geographic),
/// GTRasterTypeGeoKey=1 (RasterPixelIsArea), GeographicTypeGeoKey=4326.
const GEOKEYS: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];
