//! Tangent-plane World Coordinate System and its flat header form.
//!
//! A [`Wcs`] converts to a [`WcsHeader`] without loss and can be rebuilt from
//! one, so the header is the only thing that needs to travel over the wire.

use crate::error::{Error, Result};
use crate::model::{HeaderValue, WcsHeader};

/// Keys owned by the structured fields of [`Wcs`]. Everything else in a header
/// is carried through verbatim.
const STRUCTURAL_KEYS: &[&str] = &[
    "WCSAXES", "CTYPE1", "CTYPE2", "CUNIT1", "CUNIT2", "CRVAL1", "CRVAL2", "CRPIX1", "CRPIX2",
    "CD1_1", "CD1_2", "CD2_1", "CD2_2", "PC1_1", "PC1_2", "PC2_1", "PC2_2", "CDELT1", "CDELT2",
    "IMAGEW", "IMAGEH",
];

/// A fitted pixel-to-sky transform using the gnomonic (TAN) projection.
///
/// Pixel coordinates follow the FITS convention used in the header: `CRPIX`
/// is the reference pixel and the CD matrix maps pixel offsets to
/// intermediate world coordinates in degrees.
///
/// Only the linear part of the fit is modelled. SIP distortion terms
/// (`A_ORDER`, `A_p_q`, `B_p_q`, ...) and a `-SIP` axis type are carried in
/// the header untouched, but [`Wcs::pixel_to_sky`] and [`Wcs::center`] do not
/// apply them, so positions away from `CRPIX` can differ from astrometry.net's
/// own by the size of the distortion correction.
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs {
    /// Reference pixel (CRPIX1, CRPIX2).
    pub crpix: (f64, f64),
    /// Reference sky position in degrees (CRVAL1 = RA, CRVAL2 = Dec).
    pub crval: (f64, f64),
    /// [[CD1_1, CD1_2], [CD2_1, CD2_2]] in degrees per pixel.
    pub cd: [[f64; 2]; 2],
    /// Axis types, e.g. ("RA---TAN", "DEC--TAN").
    pub ctype: (String, String),
    /// Image width and height in pixels, when the fit recorded them.
    pub image_size: Option<(u32, u32)>,
    extra: WcsHeader,
}

impl Wcs {
    pub fn new(crpix: (f64, f64), crval: (f64, f64), cd: [[f64; 2]; 2]) -> Self {
        Self {
            crpix,
            crval,
            cd,
            ctype: ("RA---TAN".to_string(), "DEC--TAN".to_string()),
            image_size: None,
            extra: WcsHeader::new(),
        }
    }

    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = Some((width, height));
        self
    }

    /// Attach an additional header card (e.g. `EQUINOX`, SIP terms).
    ///
    /// Keys that belong to the structured fields are ignored.
    pub fn with_extra(mut self, key: &str, value: impl Into<HeaderValue>) -> Self {
        if !is_structural(key) {
            self.extra.insert(key, value);
        }
        self
    }

    /// Additional header cards carried alongside the core transform.
    pub fn extra(&self) -> &WcsHeader {
        &self.extra
    }

    /// Convert pixel coordinates to sky coordinates (RA, Dec in degrees).
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix.0;
        let dy = y - self.crpix.1;

        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let ra0 = self.crval.0.to_radians();
        let (sin_dec0, cos_dec0) = self.crval.1.to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;

        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2((xi * xi + denom * denom).sqrt());

        (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// Convert sky coordinates (RA, Dec in degrees) to pixel coordinates.
    ///
    /// Returns `None` for points on the far hemisphere or when the CD matrix
    /// is singular.
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (sin_dec, cos_dec) = dec.to_radians().sin_cos();
        let (sin_dec0, cos_dec0) = self.crval.1.to_radians().sin_cos();
        let (sin_dra, cos_dra) = (ra - self.crval.0).to_radians().sin_cos();

        let d = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        if d <= 0.0 {
            return None;
        }

        let xi = (cos_dec * sin_dra / d).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / d).to_degrees();

        let det = self.determinant();
        if det.abs() < f64::EPSILON * f64::EPSILON {
            return None;
        }

        let dx = (self.cd[1][1] * xi - self.cd[0][1] * eta) / det;
        let dy = (-self.cd[1][0] * xi + self.cd[0][0] * eta) / det;

        Some((self.crpix.0 + dx, self.crpix.1 + dy))
    }

    /// Pixel scale in arcseconds per pixel.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        self.determinant().abs().sqrt() * 3600.0
    }

    /// Sky position of the image center, or the reference point when the
    /// image size is unknown. Ignores SIP distortion.
    pub fn center(&self) -> (f64, f64) {
        match self.image_size {
            Some((w, h)) => self.pixel_to_sky((w as f64 + 1.0) / 2.0, (h as f64 + 1.0) / 2.0),
            None => self.crval,
        }
    }

    fn determinant(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }

    /// Flatten the transform into header cards. Never fails.
    pub fn to_header(&self) -> WcsHeader {
        let mut header = self.extra.clone();

        header.insert("WCSAXES", 2_i64);
        header.insert("CTYPE1", self.ctype.0.as_str());
        header.insert("CTYPE2", self.ctype.1.as_str());
        header.insert("CUNIT1", "deg");
        header.insert("CUNIT2", "deg");
        header.insert("CRVAL1", self.crval.0);
        header.insert("CRVAL2", self.crval.1);
        header.insert("CRPIX1", self.crpix.0);
        header.insert("CRPIX2", self.crpix.1);
        header.insert("CD1_1", self.cd[0][0]);
        header.insert("CD1_2", self.cd[0][1]);
        header.insert("CD2_1", self.cd[1][0]);
        header.insert("CD2_2", self.cd[1][1]);

        if let Some((w, h)) = self.image_size {
            header.insert("IMAGEW", i64::from(w));
            header.insert("IMAGEH", i64::from(h));
        }

        header
    }

    /// Rebuild a transform from header cards.
    ///
    /// Accepts the CD-matrix form, the PC + CDELT form, or CDELT alone.
    pub fn from_header(header: &WcsHeader) -> Result<Self> {
        let crval = (number(header, "CRVAL1")?, number(header, "CRVAL2")?);
        let crpix = (number(header, "CRPIX1")?, number(header, "CRPIX2")?);
        let cd = linear_transform(header)?;

        let ctype = (
            text_or(header, "CTYPE1", "RA---TAN")?,
            text_or(header, "CTYPE2", "DEC--TAN")?,
        );

        let image_size = match (header.get("IMAGEW"), header.get("IMAGEH")) {
            (Some(_), Some(_)) => Some((
                dimension(header, "IMAGEW")?,
                dimension(header, "IMAGEH")?,
            )),
            _ => None,
        };

        let extra = header
            .iter()
            .filter(|(key, _)| !is_structural(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            crpix,
            crval,
            cd,
            ctype,
            image_size,
            extra,
        })
    }
}

fn is_structural(key: &str) -> bool {
    STRUCTURAL_KEYS.contains(&key)
}

fn linear_transform(header: &WcsHeader) -> Result<[[f64; 2]; 2]> {
    let has_cd = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"]
        .iter()
        .any(|key| header.contains_key(key));

    if has_cd {
        return Ok([
            [number_or(header, "CD1_1", 0.0)?, number_or(header, "CD1_2", 0.0)?],
            [number_or(header, "CD2_1", 0.0)?, number_or(header, "CD2_2", 0.0)?],
        ]);
    }

    let cdelt1 = number(header, "CDELT1")?;
    let cdelt2 = number(header, "CDELT2")?;
    let pc = [
        [number_or(header, "PC1_1", 1.0)?, number_or(header, "PC1_2", 0.0)?],
        [number_or(header, "PC2_1", 0.0)?, number_or(header, "PC2_2", 1.0)?],
    ];

    Ok([
        [cdelt1 * pc[0][0], cdelt1 * pc[0][1]],
        [cdelt2 * pc[1][0], cdelt2 * pc[1][1]],
    ])
}

fn number(header: &WcsHeader, key: &str) -> Result<f64> {
    match header.get(key) {
        Some(value) => value.as_f64().ok_or_else(|| Error::WcsHeader {
            key: key.to_string(),
            reason: format!("expected a number, found {:?}", value),
        }),
        None => Err(Error::WcsHeader {
            key: key.to_string(),
            reason: "missing".to_string(),
        }),
    }
}

fn number_or(header: &WcsHeader, key: &str, default: f64) -> Result<f64> {
    if header.contains_key(key) {
        number(header, key)
    } else {
        Ok(default)
    }
}

fn text_or(header: &WcsHeader, key: &str, default: &str) -> Result<String> {
    match header.get(key) {
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::WcsHeader {
                key: key.to_string(),
                reason: format!("expected a string, found {:?}", value),
            }),
        None => Ok(default.to_string()),
    }
}

fn dimension(header: &WcsHeader, key: &str) -> Result<u32> {
    let value = number(header, key)?;
    if value < 0.0 || value > f64::from(u32::MAX) || value.fract() != 0.0 {
        return Err(Error::WcsHeader {
            key: key.to_string(),
            reason: format!("{} is not a valid pixel dimension", value),
        });
    }
    Ok(value as u32)
}
